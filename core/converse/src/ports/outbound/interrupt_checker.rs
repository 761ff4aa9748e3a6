//! Ctrl+C（SIGINT）等による割り込みを検知する Outbound ポート
//!
//! ストリーミング中にユーザーが中断した場合、ターンを打ち切って Error::Interrupted を返すために使用する。

/// 割り込みが要求されたかどうかを返す能力
///
/// usecase はストリームの各差分の合間とモデル呼び出しの前にこの trait を参照する。
/// 対話ループは入力待ちとターン開始を通知する（割り込みの扱いを切り替える実装だけが上書きする）。
pub trait InterruptChecker: Send + Sync {
    fn is_interrupted(&self) -> bool;

    /// プロンプトで入力待ちに入る
    fn enter_prompt(&self) {}

    /// ターンを始める（前のターンの割り込みは忘れる）
    fn enter_turn(&self) {}
}
