//! TIM1ベースのHブリッジドライバー
//!
//! DCギアモーターを駆動するハーフブリッジ2組を制御します。
//! ローサイドはTIM1のPWM（8bit分解能）、ハイサイドはGPIOゲートです。
//!
//! ## ハードウェア構成
//! - TIM1_CH1 (PA8):  LOW1 PWM（下降側、比較レジスタCCR1）
//! - TIM1_CH4 (PA11): LOW2 PWM（上昇側、比較レジスタCCR4）
//! - PB10: HIGH1ゲート（上昇時に閉じる）
//! - PB11: HIGH2ゲート（下降時に閉じる）
//!
//! 上昇 = LOW2 PWM有効 + HIGH1ゲート、下降 = LOW1 PWM有効 + HIGH2ゲート。
//! すべてPACレジスタ直接操作なので、Hallエッジ割り込みからも呼び出せます。

use embassy_stm32::pac;

use crate::motion::HBridge;

/// PWMキャリア周波数設定
/// 170MHz / (PSC+1) / (ARR+1) = 170MHz / 33 / 256 ≈ 20kHz
const PWM_PRESCALER: u16 = 32;

/// デューティ分解能（8bit、比較レジスタにcurr_pwmをそのまま書く）
const PWM_PERIOD: u16 = 255;

/// TIM1 Hブリッジ出力の初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_bridge() {
    let rcc = pac::RCC;
    let tim1 = pac::TIM1;
    let gpioa = pac::GPIOA;
    let gpiob = pac::GPIOB;

    // 1. クロック有効化
    rcc.ahb2enr().modify(|w| {
        w.set_gpioaen(true);
        w.set_gpioben(true);
    });
    rcc.apb2enr().modify(|w| w.set_tim1en(true));

    // 2. ハイサイドゲート（PB10/PB11）を出力・Lowに設定
    gpiob.bsrr().write(|w| {
        w.set_br(10, true);
        w.set_br(11, true);
    });
    gpiob
        .moder()
        .modify(|w| w.set_moder(10, pac::gpio::vals::Moder::OUTPUT));
    gpiob
        .moder()
        .modify(|w| w.set_moder(11, pac::gpio::vals::Moder::OUTPUT));

    // 3. GPIO設定（PWM出力ピンをAlternate Functionに設定）

    // PA8: TIM1_CH1 (AF6)
    gpioa
        .moder()
        .modify(|w| w.set_moder(8, pac::gpio::vals::Moder::ALTERNATE));
    gpioa.afr(1).modify(|w| w.set_afr(0, 6)); // AFR[1] = AFRH, PA8はAFRH[0]
    gpioa
        .ospeedr()
        .modify(|w| w.set_ospeedr(8, pac::gpio::vals::Ospeedr::VERY_HIGH_SPEED));

    // PA11: TIM1_CH4 (AF11)
    gpioa
        .moder()
        .modify(|w| w.set_moder(11, pac::gpio::vals::Moder::ALTERNATE));
    gpioa.afr(1).modify(|w| w.set_afr(3, 11)); // AFRH[3]
    gpioa
        .ospeedr()
        .modify(|w| w.set_ospeedr(11, pac::gpio::vals::Ospeedr::VERY_HIGH_SPEED));

    // 4. TIM1設定
    tim1.cr1().modify(|w| w.set_cen(false));
    tim1.psc().write_value(PWM_PRESCALER);
    tim1.arr().write_value(pac::timer::regs::ArrCore(PWM_PERIOD as u32));

    // 5. PWMモード設定（CH1/CH4、PWM mode 1 + プリロード）
    tim1.ccmr_output(0).modify(|w| {
        w.set_ocm(0, pac::timer::vals::Ocm::PWM_MODE1); // CH1
        w.set_ocpe(0, true);
    });
    tim1.ccmr_output(1).modify(|w| {
        w.set_ocm(1, pac::timer::vals::Ocm::PWM_MODE1); // CH4
        w.set_ocpe(1, true);
    });

    // 比較レジスタを0、チャネルは無効のまま
    tim1.ccr(0).write_value(pac::timer::regs::Ccr1ch(0));
    tim1.ccr(3).write_value(pac::timer::regs::Ccr1ch(0));
    tim1.ccer().modify(|w| {
        w.set_cce(0, false);
        w.set_cce(3, false);
    });

    // 6. アドバンスドタイマーはMOEを立てないと出力されない
    tim1.bdtr().modify(|w| w.set_moe(true));

    // 7. カウンタ開始
    tim1.egr().write(|w| w.set_ug(true)); // プリスケーラ反映
    tim1.cr1().modify(|w| {
        w.set_arpe(true);
        w.set_cen(true);
    });
}

/// Hブリッジ操作のハンドル
///
/// レジスタ直書きなので状態を持たず、どのコンテキストからでも生成できる
pub struct PwmBridge;

impl HBridge for PwmBridge {
    fn energize_up(&mut self, pwm: u8) {
        let tim1 = pac::TIM1;
        let gpiob = pac::GPIOB;
        tim1.ccr(3).write_value(pac::timer::regs::Ccr1ch(pwm as u32));
        tim1.ccer().modify(|w| w.set_cce(3, true)); // LOW2 PWM有効
        gpiob.bsrr().write(|w| w.set_bs(10, true)); // HIGH1ゲート
    }

    fn energize_down(&mut self, pwm: u8) {
        let tim1 = pac::TIM1;
        let gpiob = pac::GPIOB;
        tim1.ccr(0).write_value(pac::timer::regs::Ccr1ch(pwm as u32));
        tim1.ccer().modify(|w| w.set_cce(0, true)); // LOW1 PWM有効
        gpiob.bsrr().write(|w| w.set_bs(11, true)); // HIGH2ゲート
    }

    fn set_duty_up(&mut self, pwm: u8) {
        pac::TIM1
            .ccr(3)
            .write_value(pac::timer::regs::Ccr1ch(pwm as u32));
    }

    fn set_duty_down(&mut self, pwm: u8) {
        pac::TIM1
            .ccr(0)
            .write_value(pac::timer::regs::Ccr1ch(pwm as u32));
    }

    /// 両チャネル無効 → 両ゲート解放 → 比較レジスタクリアの順で停止する
    fn deenergize(&mut self) {
        let tim1 = pac::TIM1;
        let gpiob = pac::GPIOB;
        tim1.ccer().modify(|w| {
            w.set_cce(0, false);
            w.set_cce(3, false);
        });
        gpiob.bsrr().write(|w| {
            w.set_br(10, true);
            w.set_br(11, true);
        });
        tim1.ccr(0).write_value(pac::timer::regs::Ccr1ch(0));
        tim1.ccr(3).write_value(pac::timer::regs::Ccr1ch(0));
    }
}
