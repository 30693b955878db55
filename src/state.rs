//! グローバル共有状態管理
//!
//! モーターコアはプロセス全体で唯一の`Motor`値としてクリティカル
//! セクション付きセルに保持し、割り込み・タスクの双方から`with_motor`で
//! アクセスします。コマンドメールボックスと電池状態はアトミック変数です。

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::motion::{DeferredCommand, Motor};

/// モーター状態シングルトン
///
/// Hallエッジ割り込みからもアクセスするため、クリティカルセクションで保護
pub static MOTOR: Mutex<CriticalSectionRawMutex, RefCell<Motor>> =
    Mutex::new(RefCell::new(Motor::new()));

/// モーター状態への排他アクセス
///
/// クロージャ内ではブロックする処理を行わないこと
pub fn with_motor<R>(f: impl FnOnce(&mut Motor) -> R) -> R {
    MOTOR.lock(|cell| f(&mut cell.borrow_mut()))
}

/// 遅延実行コマンドのメールボックス（1スロット、後勝ち）
static DEFERRED_COMMAND: AtomicU8 = AtomicU8::new(0);

/// コマンドを積む。未実行のコマンドは新しいコマンドで上書きされる
pub fn defer_command(command: DeferredCommand) {
    DEFERRED_COMMAND.store(command as u8, Ordering::Relaxed);
}

/// 積まれたコマンドを取り出してスロットを空にする
pub fn take_deferred_command() -> DeferredCommand {
    DeferredCommand::from_u8(DEFERRED_COMMAND.swap(0, Ordering::Relaxed))
}

/// 電池電圧 [1/16 V]（ステータス応答用）
pub static BATTERY_VOLTAGE_16THS: AtomicU8 = AtomicU8::new(0);

/// 電池残量推定 [%]（ステータス応答用）
pub static BATTERY_PERCENT: AtomicU8 = AtomicU8::new(0);

/// 低電圧フラグ（セット中はモーター起動を拒否）
pub static UNDERVOLTAGE: AtomicBool = AtomicBool::new(false);
