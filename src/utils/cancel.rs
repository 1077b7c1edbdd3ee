use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::utils::{IpfsError, Result};

/// Fails with `Cancelled` once the token has fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(IpfsError::Cancelled)
    } else {
        Ok(())
    }
}

/// Races a read-only wait against the token.
///
/// Only for futures that are safe to drop half way (network waits, block
/// reads). Writes check `ensure_active` between steps instead.
pub async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IpfsError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let res: Result<()> = until_cancelled(&cancel, async {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(IpfsError::Cancelled)));
        assert!(ensure_active(&cancel).is_err());
    }

    #[tokio::test]
    async fn test_completes_when_active() {
        let cancel = CancellationToken::new();
        let res = until_cancelled(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(res, 7);
        assert!(ensure_active(&cancel).is_ok());
    }
}
