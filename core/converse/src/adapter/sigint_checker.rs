//! Ctrl+C（SIGINT）で割り込みフラグを立てる InterruptChecker 実装
//!
//! コンストラクタで ctrlc ハンドラを登録する。ターン中の Ctrl+C はフラグを立て、
//! is_interrupted() でターンを打ち切る。対話ループの入力待ち中の Ctrl+C はプロセスを終了する。

use crate::ports::outbound::InterruptChecker;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 入力待ち中の Ctrl+C で終了するときの終了コード（Error::Interrupted と同じ）
const EXIT_INTERRUPTED: i32 = 130;

/// Ctrl+C を受けたときの動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigintAction {
    /// 実行中のターンを打ち切る
    Interrupt,
    /// 入力待ちなのでプロセスを終える
    Quit,
}

fn on_sigint(flag: &AtomicBool, at_prompt: &AtomicBool) -> SigintAction {
    if at_prompt.load(Ordering::Relaxed) {
        SigintAction::Quit
    } else {
        flag.store(true, Ordering::Relaxed);
        SigintAction::Interrupt
    }
}

/// Ctrl+C を受けたらフラグを立てる実装
pub struct SigintChecker {
    flag: Arc<AtomicBool>,
    at_prompt: Arc<AtomicBool>,
}

impl SigintChecker {
    /// 新しいチェッカーを作成し、SIGINT ハンドラを登録する。
    /// ハンドラはプロセスで 1 回しか登録できない（ctrlc の仕様）ので、2 回目は Err になる。
    pub fn new() -> Result<Self, ctrlc::Error> {
        let flag = Arc::new(AtomicBool::new(false));
        let at_prompt = Arc::new(AtomicBool::new(false));
        let (flag_clone, prompt_clone) = (Arc::clone(&flag), Arc::clone(&at_prompt));
        ctrlc::set_handler(move || {
            if on_sigint(&flag_clone, &prompt_clone) == SigintAction::Quit {
                let mut err = std::io::stderr();
                let _ = writeln!(err);
                let _ = err.flush();
                std::process::exit(EXIT_INTERRUPTED);
            }
        })?;
        Ok(Self { flag, at_prompt })
    }
}

impl InterruptChecker for SigintChecker {
    fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn enter_prompt(&self) {
        self.at_prompt.store(true, Ordering::Relaxed);
    }

    fn enter_turn(&self) {
        self.flag.store(false, Ordering::Relaxed);
        self.at_prompt.store(false, Ordering::Relaxed);
    }
}

/// 割り込みを検知しないスタブ（ハンドラ登録に失敗した場合や受信イベント処理で使用）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterruptChecker;

impl InterruptChecker for NoopInterruptChecker {
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// 任意のタイミングで割り込みを立てられるチェッカー（テスト用）
#[cfg(test)]
#[derive(Default)]
pub struct FlagInterruptChecker {
    flag: AtomicBool,
}

#[cfg(test)]
impl FlagInterruptChecker {
    pub fn trip(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
impl InterruptChecker for FlagInterruptChecker {
    fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
