//! TIM4ベースのHallセンサーインターフェース実装
//!
//! 2つのHallセンサーのエッジをTIM4の入力キャプチャ（両エッジ）で検出し、
//! エッジごとに `(センサー番号, レベル)` をモーターコアの直交デコーダーへ
//! 渡します。位置カウントと目標到達判定は割り込みコンテキストで完結します。
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): Hall S1
//! - TIM4_CH2 (PB7): Hall S2
//! - クロック: 170MHz (APB1)
//!
//! ## 動作原理
//! 1. CH1/CH2を各TIに両エッジキャプチャで接続する（CCER.CCxP/CCxNP=1）
//! 2. エッジでCCx割り込みが発生する
//! 3. ハンドラーがGPIO IDRから現在レベルを読み、コアへ通知する
//!
//! エッジ間隔の計測はタイマーカウントではなく1msティックの
//! アイドルカウンタで行うため、キャプチャ値自体は使用しません。

use embassy_stm32::pac;

use crate::bridge::PwmBridge;
use crate::motion::quadrature::HallInput;
use crate::state;

/// TIM4 Hallセンサーインターフェースの初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_hall_timer() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;
    let gpiob = pac::GPIOB;

    // 1. クロック有効化
    rcc.ahb2enr().modify(|w| w.set_gpioben(true)); // GPIOB
    rcc.apb1enr1().modify(|w| w.set_tim4en(true)); // TIM4

    // 2. GPIO設定（PB6/PB7をAlternate Function AF2に設定）
    // 注: センサーはオープンコレクタ、基板上に外部プルアップ抵抗あり

    // PB6: TIM4_CH1 (Hall S1)
    gpiob
        .moder()
        .modify(|w| w.set_moder(6, pac::gpio::vals::Moder::ALTERNATE));
    gpiob.afr(0).modify(|w| w.set_afr(6, 2)); // AF2 (AFR[0] = AFRL)
    gpiob
        .pupdr()
        .modify(|w| w.set_pupdr(6, pac::gpio::vals::Pupdr::FLOATING));
    gpiob
        .ospeedr()
        .modify(|w| w.set_ospeedr(6, pac::gpio::vals::Ospeedr::VERY_HIGH_SPEED));

    // PB7: TIM4_CH2 (Hall S2)
    gpiob
        .moder()
        .modify(|w| w.set_moder(7, pac::gpio::vals::Moder::ALTERNATE));
    gpiob.afr(0).modify(|w| w.set_afr(7, 2)); // AF2
    gpiob
        .pupdr()
        .modify(|w| w.set_pupdr(7, pac::gpio::vals::Pupdr::FLOATING));
    gpiob
        .ospeedr()
        .modify(|w| w.set_ospeedr(7, pac::gpio::vals::Ospeedr::VERY_HIGH_SPEED));

    // 3. TIM4設定（フリーラン、キャプチャトリガー専用）
    tim4.cr1().modify(|w| w.set_cen(false));
    tim4.psc().write_value(0);
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

    // 4. Input Capture設定（CH1/CH2をそれぞれのTIにマップ）
    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4); // CC1S = 01 (IC1 -> TI1)
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8); // 8サイクルフィルタ
        w.set_ccs(1, pac::timer::vals::CcmrInputCcs::TI4); // CC2S = 01 (IC2 -> TI2)
        w.set_icf(1, pac::timer::vals::FilterValue::FCK_INT_N8);
    });

    // 5. CCER: キャプチャ有効、両エッジ（CCxP=1, CCxNP=1）
    tim4.ccer().modify(|w| {
        w.set_cce(0, true);
        w.set_ccp(0, true);
        w.set_ccnp(0, true);
        w.set_cce(1, true);
        w.set_ccp(1, true);
        w.set_ccnp(1, true);
    });

    // 6. 割り込み設定（CC1IE/CC2IE）
    tim4.dier().modify(|w| {
        w.set_ccie(0, true);
        w.set_ccie(1, true);
    });

    // 7. 割り込み有効化（NVIC）
    // Embassyタスクより高優先度にする（Priority 2 = 0x20）
    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM4);
        let mut cp = cortex_m::Peripherals::steal();
        cp.NVIC.set_priority(pac::Interrupt::TIM4, 0x20);
    }

    // 8. カウンタをリセットしてタイマー開始
    tim4.cnt().write_value(pac::timer::regs::CntCore(0));
    tim4.sr().write(|w| w.0 = 0); // ステータスフラグクリア
    tim4.cr1().modify(|w| w.set_cen(true));
}

/// TIM4割り込みハンドラー（Capture/Compare 1/2 = Hallエッジ）
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
pub unsafe fn tim4_irq_handler() {
    let tim4 = pac::TIM4;
    let gpiob = pac::GPIOB;

    let sr = tim4.sr().read();

    // CH1キャプチャ（Hall S1エッジ）
    if sr.ccif(0) {
        tim4.sr().modify(|w| w.set_ccif(0, false));
        let _ = tim4.ccr(0).read(); // キャプチャ値は未使用、読み捨て
        let level = gpiob.idr().read().idr(6) as u8 != 0;
        state::with_motor(|m| m.hall_edge(HallInput::Hall1, level, &mut PwmBridge));
    }

    // CH2キャプチャ（Hall S2エッジ）
    if sr.ccif(1) {
        tim4.sr().modify(|w| w.set_ccif(1, false));
        let _ = tim4.ccr(1).read();
        let level = gpiob.idr().read().idr(7) as u8 != 0;
        state::with_motor(|m| m.hall_edge(HallInput::Hall2, level, &mut PwmBridge));
    }
}

/// TIM4割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM4() {
    tim4_irq_handler();
}
