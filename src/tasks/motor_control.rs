//! モーター制御タスク
//!
//! 10ms周期で遅延実行コマンドの取り出しと速度レギュレーターを回します。
//! Hブリッジの切り替え（通電開始）はこのタスクだけが行い、切り替え前には
//! 必ず停止させてから整定時間を置きます。

use core::sync::atomic::Ordering;

use embassy_time::{Duration, Instant, Ticker, Timer};

use crate::bridge::PwmBridge;
use crate::fmt::*;
use crate::motion::{DeferredCommand, Direction, Status};
use crate::state;

/// 通電開始前の整定待ち時間
const START_SETTLE_MS: u64 = 10;

/// モーター制御タスク（10msレギュレーターティック + コマンド実行）
#[embassy_executor::task]
pub async fn motor_control_task() {
    info!("Motor control task started");

    let mut ticker = Ticker::every(Duration::from_millis(10));

    loop {
        ticker.next().await;

        match state::take_deferred_command() {
            DeferredCommand::None => {}
            DeferredCommand::Stop => {
                state::with_motor(|m| m.motor_stop(&mut PwmBridge));
                info!("Motor stopped by host command");
            }
            command @ (DeferredCommand::MotorUp | DeferredCommand::MotorDown) => {
                start_movement(command).await;
            }
        }

        state::with_motor(|m| m.regulator_tick(&mut PwmBridge));
    }
}

async fn start_movement(command: DeferredCommand) {
    // エラーラッチ中はStopでしか復帰できない
    if state::with_motor(|m| m.status() == Status::Error) {
        warn!("Motion command ignored: error latched, send stop first");
        return;
    }

    // 低電圧時は通電しない
    if state::UNDERVOLTAGE.load(Ordering::Relaxed) {
        warn!("Motion command ignored: battery below minimum voltage");
        return;
    }

    let direction = match command {
        DeferredCommand::MotorUp => Direction::Up,
        DeferredCommand::MotorDown => Direction::Down,
        _ => return,
    };

    // 方向切り替え時の貫通を避けるため、一度止めて整定させてから通電する
    state::with_motor(|m| m.motor_stop(&mut PwmBridge));
    Timer::after(Duration::from_millis(START_SETTLE_MS)).await;

    let now = Instant::now().as_millis() as u32;
    state::with_motor(|m| m.energize(direction, now, &mut PwmBridge));

    match direction {
        Direction::Up => info!("Motor energized: up (target {})", state::with_motor(|m| m.target_location())),
        Direction::Down => info!("Motor energized: down (target {})", state::with_motor(|m| m.target_location())),
        Direction::None => {}
    }
}
