//! 電圧監視タスク
//!
//! 電池パック電圧を監視し、ステータス応答用の値を更新します。
//! `minimum_voltage`設定が有効な場合、しきい値を下回ると低電圧フラグを
//! 立ててモーターの新規起動を抑止します。

use core::sync::atomic::Ordering;

use embassy_stm32::{adc::Adc, peripherals};
use embassy_time::{Duration, Ticker};

use crate::fmt::*;
use crate::state;
use crate::voltage_monitor::{BatteryMonitor, BatteryMonitorConfig};

/// 電圧監視タスク - 電池電圧の計測・フィルタ・低電圧判定
#[embassy_executor::task]
pub async fn voltage_monitor_task(
    mut adc: Adc<'static, peripherals::ADC2>,
    mut voltage_pin: embassy_stm32::adc::AnyAdcChannel<peripherals::ADC2>,
) {
    info!("Voltage monitor task started");

    let mut monitor = BatteryMonitor::new(BatteryMonitorConfig::default());

    // 初回ADC読み取りでフィルタを初期化（起動時の低電圧誤検出を防ぐ）
    let initial_adc = adc.blocking_read(&mut voltage_pin);
    monitor.initialize_with_adc(initial_adc);
    info!(
        "Initial battery voltage: {}/16 V (ADC raw: {})",
        monitor.get_state().voltage_16ths,
        initial_adc
    );

    // 監視周期（100ms）
    let mut ticker = Ticker::every(Duration::from_millis(100));

    // デバッグログ用カウンタ（10秒ごとにログ）
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        let adc_raw = adc.blocking_read(&mut voltage_pin);
        let minimum_voltage = state::with_motor(|m| m.settings().minimum_voltage);
        let battery = monitor.update(adc_raw, minimum_voltage);

        state::BATTERY_VOLTAGE_16THS.store(battery.voltage_16ths, Ordering::Relaxed);
        state::BATTERY_PERCENT.store(battery.percent, Ordering::Relaxed);
        state::UNDERVOLTAGE.store(battery.undervoltage, Ordering::Relaxed);

        log_counter += 1;
        if log_counter >= 100 {
            log_counter = 0;
            info!(
                "[Battery] {}/16 V, {}%, undervoltage={}",
                battery.voltage_16ths, battery.percent, battery.undervoltage
            );
        }
    }
}
