//! ストール監視タスク
//!
//! 1ms周期でHallエッジのアイドル時間を進め、ストール検出と上端
//! キャリブレーションの整定タイムアウトを駆動します。

use embassy_time::{Duration, Instant, Ticker};

use crate::bridge::PwmBridge;
use crate::fmt::*;
use crate::motion::Status;
use crate::state;

/// ストール監視タスク（1msティック）
#[embassy_executor::task]
pub async fn stall_monitor_task() {
    info!("Stall monitor task started");

    let mut ticker = Ticker::every(Duration::from_millis(1));

    loop {
        ticker.next().await;

        let now = Instant::now().as_millis() as u32;
        let (before, after) = state::with_motor(|m| {
            let before = m.status();
            m.stall_tick(now, &mut PwmBridge);
            (before, m.status())
        });

        if before == after {
            continue;
        }
        match after {
            Status::CalibratingEndPoint => {
                info!("Stall going up: top endpoint reached, settling");
            }
            Status::Error => {
                error!("Stall going down: motor latched in error state");
            }
            Status::Stopped if before == Status::CalibratingEndPoint => {
                info!("Endpoint calibration done, location zeroed");
            }
            Status::Stopped => {
                info!("Stall while decelerating, treated as clean stop");
            }
            _ => {}
        }
    }
}
