//! LED制御タスク
//!
//! ステータスLEDでモーター状態を表示します。
//! 停止中 = 2秒周期の短い点滅、移動中 = 点灯、整定中 = 中速点滅、
//! エラー = 高速点滅。

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use crate::fmt::*;
use crate::motion::Status;
use crate::state;

/// ステータスLEDタスク
#[embassy_executor::task]
pub async fn led_task(mut led: Output<'static>) {
    info!("LED task started");

    loop {
        match state::with_motor(|m| m.status()) {
            Status::Stopped => {
                led.set_high();
                Timer::after(Duration::from_millis(50)).await;
                led.set_low();
                Timer::after(Duration::from_millis(1950)).await;
            }
            Status::Moving | Status::Stopping => {
                led.set_high();
                Timer::after(Duration::from_millis(100)).await;
            }
            Status::CalibratingEndPoint => {
                led.set_high();
                Timer::after(Duration::from_millis(250)).await;
                led.set_low();
                Timer::after(Duration::from_millis(250)).await;
            }
            Status::Error => {
                led.set_high();
                Timer::after(Duration::from_millis(100)).await;
                led.set_low();
                Timer::after(Duration::from_millis(100)).await;
            }
        }
    }
}
