//! フラッシュメモリベースのEEPROM実装
//!
//! STM32G431VBの最終フラッシュページ（ページ63）を設定レコードのログとして
//! 使用します。1レコード = 8バイト（ダブルワード書き込み単位）で、
//! `addr | value | !addr | !value` の補数ペアが有効性チェックを兼ねます。
//! 読み出しはログを走査して各キーの最後のレコードを採用、ページが満杯に
//! なったら消去して現在値を書き直します。

use embassy_stm32::flash::{Blocking, Flash};

use super::{CurtainSettings, Setting, SETTING_COUNT};
use crate::fmt::*;

/// STM32G431VBのフラッシュページサイズ（2KB）
pub const FLASH_PAGE_SIZE: usize = 2048;

/// 最終ページの開始アドレス（128KB - 2KB = 0x0801F800）
pub const LAST_PAGE_ADDR: u32 = 0x0801F800;

/// フラッシュ先頭からのオフセット（embassyのFlash APIはオフセット指定）
pub const LAST_PAGE_OFFSET: u32 = 0x1F800;

/// 1レコードのサイズ（ダブルワード書き込み単位）
pub const RECORD_SIZE: usize = 8;

/// ページあたりのレコード数
pub const SLOT_COUNT: usize = FLASH_PAGE_SIZE / RECORD_SIZE;

/// EEPROM操作のエラー型
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EepromError {
    /// フラッシュ書き込みエラー
    FlashWriteError,

    /// フラッシュ消去エラー
    FlashEraseError,
}

/// レコードをバイト列に変換
fn encode_record(address: u16, value: u16) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];
    record[0..2].copy_from_slice(&address.to_le_bytes());
    record[2..4].copy_from_slice(&value.to_le_bytes());
    record[4..6].copy_from_slice(&(!address).to_le_bytes());
    record[6..8].copy_from_slice(&(!value).to_le_bytes());
    record
}

/// バイト列からレコードを復元（補数不一致・消去済みはNone）
fn decode_record(bytes: &[u8]) -> Option<(u16, u16)> {
    if bytes.len() < RECORD_SIZE {
        return None;
    }
    let address = u16::from_le_bytes([bytes[0], bytes[1]]);
    let value = u16::from_le_bytes([bytes[2], bytes[3]]);
    let not_address = u16::from_le_bytes([bytes[4], bytes[5]]);
    let not_value = u16::from_le_bytes([bytes[6], bytes[7]]);
    if address != !not_address || value != !not_value {
        return None;
    }
    Some((address, value))
}

fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0xFF)
}

/// 設定ストア
///
/// 全設定値のRAMキャッシュを保持し、書き込みはログへの追記で行います。
/// 書き込みはモーター停止中のみ呼ばれる前提（呼び出し側でゲート）。
pub struct SettingsStore {
    flash: Flash<'static, Blocking>,
    cached: [u16; SETTING_COUNT],
    next_slot: usize,
}

impl SettingsStore {
    /// フラッシュからログを読み込み、欠けているキーはデフォルト値で
    /// プロビジョニングする
    pub fn load(flash: Flash<'static, Blocking>) -> Self {
        let mut store = Self {
            flash,
            cached: [0; SETTING_COUNT],
            next_slot: SLOT_COUNT,
        };

        let mut found = [false; SETTING_COUNT];
        let mut end = SLOT_COUNT;
        for slot in 0..SLOT_COUNT {
            let bytes = read_slot(slot);
            if is_erased(&bytes) {
                end = slot;
                break;
            }
            if let Some((address, value)) = decode_record(&bytes) {
                if let Some(setting) = Setting::from_virtual_address(address) {
                    store.cached[setting.index()] = value;
                    found[setting.index()] = true;
                }
            }
        }
        store.next_slot = end;
        info!("Settings log: {} records in use", end);

        // 初回起動（または新キー追加後）：デフォルト値を書き戻す
        for setting in Setting::ALL {
            if !found[setting.index()] {
                let default = setting.provisioning_default();
                store.cached[setting.index()] = default;
                info!(
                    "Provisioning setting 0x{:04X} = {}",
                    setting.virtual_address(),
                    default
                );
                if let Err(e) = store.append(setting.virtual_address(), default) {
                    error!("Settings provisioning failed: {:?}", e);
                }
            }
        }

        store
    }

    /// 設定値を読む（RAMキャッシュ）
    pub fn read(&self, setting: Setting) -> u16 {
        self.cached[setting.index()]
    }

    /// 設定値を書く
    ///
    /// 値が変わらない場合は何もしません。フラッシュ書き込み中はモーター
    /// 切り替えが走らないこと（Stoppedゲート）は呼び出し側が保証します。
    pub fn write(&mut self, setting: Setting, value: u16) -> Result<(), EepromError> {
        if self.cached[setting.index()] == value {
            return Ok(());
        }
        self.cached[setting.index()] = value;
        info!(
            "Setting 0x{:04X} <- {}",
            setting.virtual_address(),
            value
        );
        self.append(setting.virtual_address(), value)
    }

    /// 現在の全設定値のスナップショット
    pub fn snapshot(&self) -> CurtainSettings {
        CurtainSettings::from_values(&self.cached)
    }

    fn append(&mut self, address: u16, value: u16) -> Result<(), EepromError> {
        if self.next_slot >= SLOT_COUNT {
            self.compact()?;
        }
        let record = encode_record(address, value);
        let offset = LAST_PAGE_OFFSET + (self.next_slot * RECORD_SIZE) as u32;
        self.flash.blocking_write(offset, &record).map_err(|e| {
            error!("Flash write failed: {:?}", e);
            EepromError::FlashWriteError
        })?;
        self.next_slot += 1;
        Ok(())
    }

    /// ページ満杯時：消去して現在値だけを書き直す
    fn compact(&mut self) -> Result<(), EepromError> {
        info!("Settings log full, compacting");
        self.flash
            .blocking_erase(LAST_PAGE_OFFSET, LAST_PAGE_OFFSET + FLASH_PAGE_SIZE as u32)
            .map_err(|e| {
                error!("Flash erase failed: {:?}", e);
                EepromError::FlashEraseError
            })?;
        self.next_slot = 0;
        for setting in Setting::ALL {
            let record = encode_record(setting.virtual_address(), self.cached[setting.index()]);
            let offset = LAST_PAGE_OFFSET + (self.next_slot * RECORD_SIZE) as u32;
            self.flash.blocking_write(offset, &record).map_err(|e| {
                error!("Flash write failed: {:?}", e);
                EepromError::FlashWriteError
            })?;
            self.next_slot += 1;
        }
        Ok(())
    }
}

/// スロットをバイト列として読む（メモリマップドなので直接読み）
fn read_slot(slot: usize) -> [u8; RECORD_SIZE] {
    let mut bytes = [0u8; RECORD_SIZE];
    let base = LAST_PAGE_ADDR as usize + slot * RECORD_SIZE;
    for (i, byte) in bytes.iter_mut().enumerate() {
        let addr = (base + i) as *const u8;
        *byte = unsafe { core::ptr::read_volatile(addr) };
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        for setting in Setting::ALL {
            let record = encode_record(setting.virtual_address(), 0xBEEF);
            assert_eq!(
                decode_record(&record),
                Some((setting.virtual_address(), 0xBEEF))
            );
        }
    }

    #[test]
    fn erased_slot_is_not_a_record() {
        let erased = [0xFFu8; RECORD_SIZE];
        assert!(is_erased(&erased));
        assert_eq!(decode_record(&erased), None);
    }

    #[test]
    fn corrupted_complement_is_rejected() {
        let mut record = encode_record(0x5555, 42);
        record[5] ^= 0x01;
        assert_eq!(decode_record(&record), None);
    }

    #[test]
    fn page_geometry() {
        // 128KB - 2KB
        assert_eq!(LAST_PAGE_ADDR, 0x0801F800);
        assert_eq!(LAST_PAGE_OFFSET + 0x0800_0000, LAST_PAGE_ADDR);
        assert_eq!(SLOT_COUNT, 256);
    }
}
