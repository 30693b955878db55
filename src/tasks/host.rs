//! ホスト通信タスク
//!
//! 無線モジュール／有線コントローラーからのコマンドフレームをUARTで受信
//! してモーターコアへディスパッチし、問い合わせには応答フレームを返します。
//! 設定ストア（フラッシュ）はこのタスクが所有し、書き込みはモーター停止中
//! のみ行います。

use core::sync::atomic::Ordering;

use embassy_futures::select::{select, Either};
use embassy_stm32::{mode::Async, usart::Uart};
use embassy_time::{Duration, Timer};

use crate::command_protocol::{self as protocol, Command, FrameParser, MAX_REPLY_LEN};
use crate::fmt::*;
use crate::motion::{DeferredCommand, Status};
use crate::settings::{Setting, SettingsStore};
use crate::state;

/// フレーム途中で通信が途切れたとみなすまでの時間
const INTERBYTE_TIMEOUT_MS: u64 = 100;

/// ホスト通信タスク - コマンド受信・ディスパッチ・応答送信
#[embassy_executor::task]
pub async fn host_task(uart: Uart<'static, Async>, mut store: SettingsStore) {
    let (mut tx, mut rx) = uart.split();

    info!("Host command task started (2400 baud)");

    let mut parser = FrameParser::new();
    let mut byte = [0u8; 1];

    loop {
        // 1バイト受信。フレーム途中のタイムアウトでパーサーをリセット
        match select(
            rx.read(&mut byte),
            Timer::after(Duration::from_millis(INTERBYTE_TIMEOUT_MS)),
        )
        .await
        {
            Either::First(Ok(())) => {}
            Either::First(Err(e)) => {
                error!("UART RX error: {:?}", e);
                parser.reset();
                continue;
            }
            Either::Second(()) => {
                parser.reset();
                continue;
            }
        }

        let Some((c1, c2)) = parser.push(byte[0]) else {
            continue;
        };

        let Some(command) = protocol::parse_command(c1, c2) else {
            // 未知のコマンドは応答なしで無視する
            debug!("Unknown command: 0x{:02X} 0x{:02X}", c1, c2);
            continue;
        };

        debug!("Command: 0x{:02X} 0x{:02X}", c1, c2);

        let mut reply = [0u8; MAX_REPLY_LEN];
        if let Some(len) = dispatch(command, &mut store, &mut reply) {
            if let Err(e) = tx.write(&reply[..len]).await {
                error!("UART TX error: {:?}", e);
            }
        }
    }
}

/// コマンドを実行する。問い合わせ系は応答フレームの長さを返す
fn dispatch(command: Command, store: &mut SettingsStore, reply: &mut [u8; MAX_REPLY_LEN]) -> Option<usize> {
    match command {
        // === 移動コマンド（遅延実行キューへ） ===
        Command::Up => {
            defer(state::with_motor(|m| m.intent_up()));
        }
        Command::Down => {
            defer(state::with_motor(|m| m.intent_down()));
        }
        Command::Stop => {
            state::defer_command(DeferredCommand::Stop);
        }
        Command::Up17Degrees => {
            defer(state::with_motor(|m| m.intent_relative_degrees(-17, true)));
        }
        Command::Down17Degrees => {
            defer(state::with_motor(|m| m.intent_relative_degrees(17, true)));
        }
        Command::OverrideUp90 => {
            defer(state::with_motor(|m| m.intent_relative_degrees(-90, false)));
        }
        Command::OverrideDown90 => {
            defer(state::with_motor(|m| m.intent_relative_degrees(90, false)));
        }
        Command::OverrideUp6 => {
            defer(state::with_motor(|m| m.intent_relative_degrees(-6, false)));
        }
        Command::OverrideDown6 => {
            defer(state::with_motor(|m| m.intent_relative_degrees(6, false)));
        }
        Command::OverrideDown5Turns => {
            defer(state::with_motor(|m| m.intent_relative_degrees(5 * 360, false)));
        }
        Command::GoToPercent(percent) => {
            let x16 = u16::from(percent.min(100)) * 16;
            defer(state::with_motor(|m| m.intent_go_to_percent_x16(x16)));
        }
        Command::GoToPercentX16(x16) => {
            defer(state::with_motor(|m| m.intent_go_to_percent_x16(x16)));
        }
        Command::GoToLocation(raw) => {
            defer(state::with_motor(|m| m.intent_go_to((raw as i32) << 1)));
        }

        // === 位置・セッションパラメータ ===
        Command::SetLocation(raw) => {
            state::with_motor(|m| m.set_location_raw((raw as i32) << 1));
        }
        Command::SetSpeed(rpm) => {
            state::with_motor(|m| m.set_session_speed(rpm));
        }
        Command::SetSlowdownFactor(factor) => {
            state::with_motor(|m| m.set_slowdown_factor(factor));
        }
        Command::SetMinSlowdownSpeed(rpm) => {
            state::with_motor(|m| m.set_min_slowdown_speed(rpm));
        }

        // === 永続化される設定 ===
        Command::SetMaxCurtainLength => {
            let location = state::with_motor(|m| m.location()).max(0) as u16;
            if persist(store, Setting::MaxCurtainLength, location) {
                state::with_motor(|m| m.set_max_curtain_length(location));
            }
        }
        Command::SetFullCurtainLength => {
            // 工場下限を学習し直したらソフト下限も同じ値に戻す
            let location = state::with_motor(|m| m.location()).max(0) as u16;
            if persist(store, Setting::FullCurtainLength, location)
                && persist(store, Setting::MaxCurtainLength, location)
            {
                state::with_motor(|m| {
                    m.set_full_curtain_length(location);
                    m.set_max_curtain_length(location);
                });
            }
        }
        Command::ResetCurtainLength => {
            let full = store.read(Setting::FullCurtainLength);
            if persist(store, Setting::MaxCurtainLength, full) {
                state::with_motor(|m| {
                    m.set_max_curtain_length(full);
                    m.begin_calibration();
                });
            }
        }
        Command::SetDefaultSpeed(rpm) => {
            if persist(store, Setting::DefaultSpeed, u16::from(rpm)) {
                state::with_motor(|m| m.set_default_speed(u16::from(rpm)));
            }
        }
        Command::SetMinimumVoltage(sixteenths) => {
            if persist(store, Setting::MinimumVoltage, u16::from(sixteenths)) {
                state::with_motor(|m| m.set_minimum_voltage(u16::from(sixteenths)));
            }
        }
        Command::SetAutoCalibration(enabled) => {
            if persist(store, Setting::AutoCalibration, u16::from(enabled)) {
                state::with_motor(|m| m.set_auto_calibration(enabled));
            }
        }

        // === 問い合わせ ===
        Command::GetStatus => {
            let battery = state::BATTERY_PERCENT.load(Ordering::Relaxed);
            let voltage = state::BATTERY_VOLTAGE_16THS.load(Ordering::Relaxed);
            let (speed, position) = state::with_motor(|m| (m.rpm(), m.position100_byte()));
            return Some(protocol::encode_status(reply, battery, voltage, speed, position));
        }
        Command::GetStatusExt => {
            let (state_byte, position, location, target) = state::with_motor(|m| {
                (
                    status_byte(m.status(), m.calibrating()),
                    m.position100_byte(),
                    clamp_i16(m.location()),
                    clamp_i16(m.target_location()),
                )
            });
            return Some(protocol::encode_status_ext(
                reply, state_byte, position, location, target,
            ));
        }
        Command::GetLocation => {
            let (location, target) =
                state::with_motor(|m| (clamp_i16(m.location()), clamp_i16(m.target_location())));
            return Some(protocol::encode_location(reply, location, target));
        }
        Command::GetLimits => {
            let (max_length, full_length) = state::with_motor(|m| {
                (
                    m.settings().max_curtain_length,
                    m.settings().full_curtain_length,
                )
            });
            return Some(protocol::encode_limits(reply, max_length, full_length));
        }
        Command::GetVersion => {
            return Some(protocol::encode_version(reply));
        }
        Command::GetDebugDir => {
            let (dir_error, rotor) = state::with_motor(|m| {
                (m.quadrature().dir_error(), m.quadrature().rotor_position())
            });
            return Some(protocol::encode_debug_dir(reply, dir_error, rotor));
        }
        Command::GetDebugHall => {
            let (h1, h2, interval) = state::with_motor(|m| {
                (
                    m.quadrature().hall_1_ticks().min(0xFFFF) as u16,
                    m.quadrature().hall_2_ticks().min(0xFFFF) as u16,
                    m.quadrature().hall_1_interval_ms().min(0xFFFF) as u16,
                )
            });
            return Some(protocol::encode_debug_hall(reply, h1, h2, interval));
        }
    }
    None
}

/// 移動意図が生じた場合のみメールボックスへ積む
fn defer(command: DeferredCommand) {
    if command != DeferredCommand::None {
        state::defer_command(command);
    }
}

/// 設定書き込み（モーター停止中のみ有効）
fn persist(store: &mut SettingsStore, setting: Setting, value: u16) -> bool {
    let stopped = state::with_motor(|m| m.status() == Status::Stopped);
    if !stopped {
        // 移動中の設定書き込みは黙って無視する
        warn!("Settings write refused: motor not stopped");
        return false;
    }
    match store.write(setting, value) {
        Ok(()) => true,
        Err(e) => {
            error!("Settings write failed: {:?}", e);
            false
        }
    }
}

/// 拡張ステータスの状態バイト（bit7 = キャリブレーション中）
fn status_byte(status: Status, calibrating: bool) -> u8 {
    let code = match status {
        Status::Stopped => 0,
        Status::Moving => 1,
        Status::Stopping => 2,
        Status::CalibratingEndPoint => 3,
        Status::Error => 4,
    };
    if calibrating {
        code | 0x80
    } else {
        code
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
