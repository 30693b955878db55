//! Battery Voltage Monitoring
//!
//! 電池パック電圧を分圧回路経由のADCで監視し、ステータス応答用の電圧・
//! 残量推定と、起動拒否用の低電圧判定を提供します。

use crate::fmt::*;

/// 残量0%とみなす電圧 [V]
const BATTERY_EMPTY_V: f32 = 5.9;

/// 残量100%とみなす電圧 [V]
const BATTERY_FULL_V: f32 = 8.4;

/// 電圧監視パラメータ
pub struct BatteryMonitorConfig {
    /// 分圧抵抗の上側 [Ω]
    pub r_upper: f32,
    /// 分圧抵抗の下側 [Ω]
    pub r_lower: f32,
    /// ADC分解能（12ビット = 4096）
    pub adc_max: u16,
    /// ADC基準電圧 [V]
    pub vref: f32,
    /// ローパスフィルタ係数（0.0-1.0、大きいほど応答速度が速い）
    pub filter_alpha: f32,
}

impl Default for BatteryMonitorConfig {
    fn default() -> Self {
        Self {
            // 分圧回路: 33.3kΩ + 3.3kΩ（電圧変換係数 11.09倍）
            // V_bat = V_adc * (33.3k + 3.3k) / 3.3k
            r_upper: 33_300.0,
            r_lower: 3_300.0,
            adc_max: 4096,
            vref: 3.3,
            filter_alpha: 0.1, // 緩やかなフィルタ
        }
    }
}

/// 電圧監視状態
#[derive(Copy, Clone)]
pub struct BatteryState {
    /// 現在の電圧 [V]（フィルタ済み）
    pub voltage: f32,
    /// 電圧 [1/16 V]（ステータス応答の単位）
    pub voltage_16ths: u8,
    /// 残量推定 [%]
    pub percent: u8,
    /// 低電圧フラグ（minimum_voltage設定との比較、0で無効）
    pub undervoltage: bool,
}

impl BatteryState {
    pub const fn new() -> Self {
        Self {
            voltage: 0.0,
            voltage_16ths: 0,
            percent: 0,
            undervoltage: false,
        }
    }
}

/// 電池監視コントローラ
pub struct BatteryMonitor {
    config: BatteryMonitorConfig,
    state: BatteryState,
}

impl BatteryMonitor {
    pub fn new(config: BatteryMonitorConfig) -> Self {
        Self {
            config,
            state: BatteryState::new(),
        }
    }

    /// ADC生値から実電圧を計算
    fn adc_to_voltage(&self, adc_raw: u16) -> f32 {
        let v_adc = (adc_raw as f32 / self.config.adc_max as f32) * self.config.vref;
        let divider_ratio = (self.config.r_upper + self.config.r_lower) / self.config.r_lower;
        v_adc * divider_ratio
    }

    /// 電圧を更新し、低電圧を判定する
    ///
    /// # Arguments
    /// * `adc_raw` - ADC生値（0-4095）
    /// * `minimum_voltage_16ths` - 起動拒否しきい値 [1/16 V]（0で無効）
    pub fn update(&mut self, adc_raw: u16, minimum_voltage_16ths: u16) -> BatteryState {
        let voltage_raw = self.adc_to_voltage(adc_raw);

        // ローパスフィルタ適用
        self.state.voltage = self.config.filter_alpha * voltage_raw
            + (1.0 - self.config.filter_alpha) * self.state.voltage;

        self.state.voltage_16ths = libm::roundf(self.state.voltage * 16.0).clamp(0.0, 255.0) as u8;

        // 残量は単純な線形近似（ホスト側で独自カーブを掛けてもよい）
        let percent = (self.state.voltage - BATTERY_EMPTY_V) / (BATTERY_FULL_V - BATTERY_EMPTY_V);
        self.state.percent = libm::roundf(percent.clamp(0.0, 1.0) * 100.0) as u8;

        let was_undervoltage = self.state.undervoltage;
        self.state.undervoltage = minimum_voltage_16ths != 0
            && (self.state.voltage_16ths as u16) < minimum_voltage_16ths;
        if self.state.undervoltage && !was_undervoltage {
            error!(
                "UNDERVOLTAGE: {}/16 V below threshold {}/16 V",
                self.state.voltage_16ths, minimum_voltage_16ths
            );
        }

        self.state
    }

    /// 現在の状態を取得
    pub fn get_state(&self) -> BatteryState {
        self.state
    }

    /// フィルタを初回測定値で初期化（起動直後の誤検出防止用）
    pub fn initialize_with_adc(&mut self, adc_raw: u16) {
        self.state.voltage = self.adc_to_voltage(adc_raw);
        self.state.voltage_16ths = libm::roundf(self.state.voltage * 16.0).clamp(0.0, 255.0) as u8;
        let percent = (self.state.voltage - BATTERY_EMPTY_V) / (BATTERY_FULL_V - BATTERY_EMPTY_V);
        self.state.percent = libm::roundf(percent.clamp(0.0, 1.0) * 100.0) as u8;
    }
}
