//! ローカル表示用の DeliverySink
//!
//! StdoutSink: テキスト差分をそのまま書き出して flush する（タイプ表示）。
//! finish() で改行を 1 つ足し、プロンプトが応答の後ろに続かないようにする。

use common::error::Error;
use common::sink::DeliverySink;
use std::io::{self, Write};

/// 標準出力（または任意の Write）へ表示する Sink
pub struct StdoutSink<W: Write + Send = io::Stdout> {
    out: W,
    wrote: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out, wrote: false }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DeliverySink for StdoutSink<W> {
    fn push(&mut self, chunk: &str) -> Result<(), Error> {
        self.out
            .write_all(chunk.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| Error::io_msg(format!("Failed to write stdout: {}", e)))?;
        if !chunk.is_empty() {
            self.wrote = true;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if std::mem::take(&mut self.wrote) {
            writeln!(self.out)
                .and_then(|_| self.out.flush())
                .map_err(|e| Error::io_msg(format!("Failed to write stdout: {}", e)))?;
        }
        Ok(())
    }
}
