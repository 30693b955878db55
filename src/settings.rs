//! 永続化される設定パラメータ
//!
//! 5つの16bit設定値を仮想アドレスで管理します。永続化はeepromモジュール
//! （フラッシュ最終ページのレコードログ）が担当します。

pub mod eeprom;

pub use eeprom::SettingsStore;

/// 設定キー（保存順に並ぶ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    /// ソフト下限 [tick]
    MaxCurtainLength,
    /// 工場出荷時の下限 [tick]
    FullCurtainLength,
    /// 起動拒否しきい値 [1/16 V]（0で無効）
    MinimumVoltage,
    /// 既定回転数 [rpm]
    DefaultSpeed,
    /// 起動時autoキャリブレーション有効フラグ
    AutoCalibration,
}

pub const SETTING_COUNT: usize = 5;

impl Setting {
    pub const ALL: [Setting; SETTING_COUNT] = [
        Setting::MaxCurtainLength,
        Setting::FullCurtainLength,
        Setting::MinimumVoltage,
        Setting::DefaultSpeed,
        Setting::AutoCalibration,
    ];

    /// フラッシュレコードの仮想アドレス
    pub fn virtual_address(self) -> u16 {
        match self {
            Setting::MaxCurtainLength => 0x5555,
            Setting::FullCurtainLength => 0x6666,
            Setting::MinimumVoltage => 0x7777,
            Setting::DefaultSpeed => 0x8888,
            Setting::AutoCalibration => 0x9999,
        }
    }

    pub fn from_virtual_address(address: u16) -> Option<Setting> {
        Setting::ALL
            .iter()
            .copied()
            .find(|s| s.virtual_address() == address)
    }

    /// 初回起動時に書き戻されるデフォルト値
    pub fn provisioning_default(self) -> u16 {
        match self {
            Setting::MaxCurtainLength => 4096,
            Setting::FullCurtainLength => 4096,
            Setting::MinimumVoltage => 0,
            Setting::DefaultSpeed => 25,
            Setting::AutoCalibration => 1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Setting::MaxCurtainLength => 0,
            Setting::FullCurtainLength => 1,
            Setting::MinimumVoltage => 2,
            Setting::DefaultSpeed => 3,
            Setting::AutoCalibration => 4,
        }
    }
}

/// モーターコアが持つ設定のRAMコピー
#[derive(Debug, Clone, Copy)]
pub struct CurtainSettings {
    pub max_curtain_length: u16,
    pub full_curtain_length: u16,
    pub minimum_voltage: u16,
    pub default_speed: u16,
    pub auto_calibration: bool,
}

impl CurtainSettings {
    pub const fn defaults() -> Self {
        Self {
            max_curtain_length: 4096,
            full_curtain_length: 4096,
            minimum_voltage: 0,
            default_speed: 25,
            auto_calibration: true,
        }
    }

    pub fn from_values(values: &[u16; SETTING_COUNT]) -> Self {
        Self {
            max_curtain_length: values[Setting::MaxCurtainLength.index()],
            full_curtain_length: values[Setting::FullCurtainLength.index()],
            minimum_voltage: values[Setting::MinimumVoltage.index()],
            default_speed: values[Setting::DefaultSpeed.index()],
            auto_calibration: values[Setting::AutoCalibration.index()] != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_addresses_are_unique() {
        for (i, a) in Setting::ALL.iter().enumerate() {
            for b in &Setting::ALL[i + 1..] {
                assert_ne!(a.virtual_address(), b.virtual_address());
            }
        }
    }

    #[test]
    fn virtual_address_round_trip() {
        for s in Setting::ALL {
            assert_eq!(Setting::from_virtual_address(s.virtual_address()), Some(s));
        }
        assert_eq!(Setting::from_virtual_address(0x1234), None);
    }

    #[test]
    fn defaults_match_provisioning_values() {
        let mut values = [0u16; SETTING_COUNT];
        for s in Setting::ALL {
            values[s.index()] = s.provisioning_default();
        }
        let settings = CurtainSettings::from_values(&values);
        assert_eq!(settings.max_curtain_length, 4096);
        assert_eq!(settings.full_curtain_length, 4096);
        assert_eq!(settings.minimum_voltage, 0);
        assert_eq!(settings.default_speed, 25);
        assert!(settings.auto_calibration);
    }
}
