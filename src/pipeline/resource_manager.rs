//! Cancellation signal and adaptive per-document timeout budgeting,
//! based on observed memory pressure.

use std::time::Duration;

use tokio::sync::watch;

/// A cooperative cancellation signal shared by every pipeline stage.
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct CancellationSignal {
    tx: watch::Sender<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once the signal is raised. Workers select! on this alongside
    /// channel recv so a full queue doesn't block shutdown.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Install OS signal handlers (SIGINT/SIGTERM, or Ctrl-C on non-unix) that
/// raise `signal` on receipt.
pub fn install_signal_handlers(signal: CancellationSignal) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal as unix_signal, SignalKind};
            let mut sigterm = match unix_signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received, cancelling in-flight work");
        signal.cancel();
    });
}

/// Compute the adaptive per-document chunking timeout.
pub fn adaptive_chunk_timeout(document_size_bytes: usize) -> Duration {
    let base_secs: f64 = if document_size_bytes < 1_000 {
        30.0
    } else if document_size_bytes < 10_000 {
        60.0
    } else if document_size_bytes < 50_000 {
        120.0
    } else if document_size_bytes < 100_000 {
        240.0
    } else {
        360.0
    };

    let mut multiplier = 1.0f64;
    if is_wsl() {
        multiplier *= 2.0;
    }
    let total_ram_gb = total_ram_gb();
    if total_ram_gb < 8.0 {
        multiplier *= 1.5;
    }
    let pressure = memory_pressure_ratio();
    if pressure > 0.9 {
        multiplier *= 2.0;
    } else if pressure > 0.8 {
        multiplier *= 1.5;
    }

    // Size-proportional factor beyond the 100 KB bracket, capped at x4.
    let size_factor = (1.0 + (document_size_bytes as f64 / 1_000_000.0)).min(4.0);
    multiplier *= size_factor;

    let uncapped = base_secs * multiplier;
    let cap = if is_wsl() { 900.0 } else { 600.0 };
    Duration::from_secs_f64(uncapped.min(cap))
}

fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

fn meminfo_field(contents: &str, field: &str) -> Option<f64> {
    contents.lines().find_map(|line| {
        line.strip_prefix(field)
            .and_then(|rest| rest.trim().split_whitespace().next())
            .and_then(|kb| kb.parse::<f64>().ok())
    })
}

fn total_ram_gb() -> f64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|c| meminfo_field(&c, "MemTotal:"))
        .map(|kb| kb / (1024.0 * 1024.0))
        .unwrap_or(16.0)
}

pub fn memory_pressure_ratio() -> f64 {
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else {
        return 0.0;
    };
    let total = meminfo_field(&contents, "MemTotal:").unwrap_or(0.0);
    let available = meminfo_field(&contents, "MemAvailable:").unwrap_or(total);
    if total <= 0.0 {
        0.0
    } else {
        1.0 - (available / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_document_uses_base_timeout() {
        let timeout = adaptive_chunk_timeout(500);
        assert!(timeout.as_secs_f64() >= 30.0);
    }

    #[test]
    fn large_document_timeout_is_capped() {
        let timeout = adaptive_chunk_timeout(50_000_000);
        assert!(timeout.as_secs_f64() <= 900.0);
    }

    #[tokio::test]
    async fn cancellation_signal_wakes_waiters() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_cancelled());
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        signal.cancel();
        handle.await.unwrap();
        assert!(signal.is_cancelled());
    }
}
