//! ハードウェア初期化モジュール
//!
//! ペリフェラルの初期化ロジックを集約します。

use embassy_stm32::{bind_interrupts, peripherals, usart, Config};

use crate::bridge;
use crate::fmt::*;
use crate::hall_tim;

// ホストUARTの割り込みをバインド
bind_interrupts!(pub struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
});

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R; // システムクロックをPLLに設定

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// TIM4 Hallセンサーインターフェース初期化
///
/// PB6=S1、PB7=S2（両エッジキャプチャ）
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_hall_sensor() {
    info!("Initializing TIM4 Hall sensor interface (both-edge capture)...");
    hall_tim::init_hall_timer();
    info!("TIM4 Hall sensor interface initialized");
}

/// TIM1 Hブリッジ出力初期化
///
/// PA8=LOW1(CCR1)、PA11=LOW2(CCR4)、PB10/PB11=ハイサイドゲート
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_motor_bridge() {
    info!("Initializing TIM1 H-bridge outputs...");
    bridge::init_bridge();
    info!("TIM1 H-bridge initialized (20kHz, 8bit duty)");
}
