#![no_std]
#![no_main]

mod fmt;

mod bridge;
mod command_protocol;
mod hall_tim;
mod hardware;
mod motion;
mod settings;
mod state;
mod tasks;
mod voltage_monitor;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel, SampleTime},
    flash::Flash,
    gpio::{Level, Output, Speed},
    usart::{self, Uart},
};
use embassy_time::{Duration, Timer};

use fmt::*;
use hardware::Irqs;
use motion::DeferredCommand;
use settings::SettingsStore;
use tasks::{host_task, led_task, motor_control_task, stall_monitor_task, voltage_monitor_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("========================================");
    info!("STM32G431VB Curtain Motor Controller");
    info!("========================================");

    // フラッシュから設定をロード（初回起動時はデフォルトでプロビジョニング）
    let flash = Flash::new_blocking(p.FLASH);
    info!("Loading settings from flash...");
    let store = SettingsStore::load(flash);
    let curtain = store.snapshot();
    info!("  max_curtain_length  = {}", curtain.max_curtain_length);
    info!("  full_curtain_length = {}", curtain.full_curtain_length);
    info!("  minimum_voltage     = {}/16 V", curtain.minimum_voltage);
    info!("  default_speed       = {} rpm", curtain.default_speed);
    info!("  auto_calibration    = {}", curtain.auto_calibration);

    // 設定をモーターコアへ適用し、必要なら起動時キャリブレーションを予約
    let boot_command = state::with_motor(|m| {
        m.apply_settings(curtain);
        m.boot()
    });
    if boot_command != DeferredCommand::None {
        info!("Auto-calibration: driving up to relearn the top endpoint");
        state::defer_command(boot_command);
    }

    // ステータスLED初期化＆タスク起動
    let led = Output::new(p.PC13, Level::Low, Speed::Low);
    spawner.spawn(led_task(led)).unwrap();

    // ホストUART初期化＆タスク起動
    // 注: 設定ストアの所有権はhost_taskに移る（フラッシュ書き込みは
    //     コマンド処理コンテキストのみ）
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = 2400;
    let uart = Uart::new(
        p.USART1,
        p.PA10,
        p.PA9,
        Irqs,
        p.DMA1_CH1,
        p.DMA1_CH2,
        uart_config,
    )
    .unwrap();
    spawner.spawn(host_task(uart, store)).unwrap();

    // ADC初期化＆電圧監視タスク起動（PC1 = ADC2_IN7）
    let mut adc2 = Adc::new(p.ADC2);
    adc2.set_sample_time(SampleTime::CYCLES640_5);
    let voltage_pin = p.PC1.degrade_adc();
    spawner
        .spawn(voltage_monitor_task(adc2, voltage_pin))
        .unwrap();
    info!("Voltage monitoring started on PC1 (ADC2_IN7)");

    // Hブリッジ出力とHallセンサーインターフェース初期化
    unsafe {
        hardware::init_motor_bridge();
        hardware::init_hall_sensor();
    }

    // モーター制御（10ms）・ストール監視（1ms）タスク起動
    spawner.spawn(motor_control_task()).unwrap();
    spawner.spawn(stall_monitor_task()).unwrap();

    info!("System initialized successfully");
    info!("Host commands (c1 c2):");
    info!("  - 0x0A 0xDD / 0xEE: up to stall / down to limit");
    info!("  - 0x0A 0x0D / 0x0E: up / down 17 degrees");
    info!("  - 0x0A 0xCC: stop");
    info!("  - 0xDD <pct>: go to percent position");
    info!("  - 0xCC 0xCC: get status");

    // メインループ（将来の拡張用）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
