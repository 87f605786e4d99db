//! Serial byte sink the stream is written to.

use embedded_io_async::Write;

#[allow(async_fn_in_trait)]
pub trait SerialLink: Write {
    /// Resolves once a consumer can receive bytes. No timeout: a monitor may
    /// attach long after power-up.
    async fn wait_ready(&mut self);
}

/// Writes `parts` back to back as one line. The caller supplies the `\n`.
pub async fn write_parts<L: SerialLink>(link: &mut L, parts: &[&str]) -> Result<(), L::Error> {
    for part in parts {
        link.write_all(part.as_bytes()).await?;
    }
    link.flush().await
}
