use tokio::sync::watch;

/// One-way shutdown flag. The daemon holds the controller; every loop that
/// must stop holds a token.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> (Self, ShutdownToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownToken { rx })
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. A dropped controller counts as
    /// a shutdown request.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_token() {
        let (controller, mut token_a) = ShutdownController::new();
        let mut token_b = controller.subscribe();
        assert!(!token_a.is_triggered());

        controller.trigger();
        token_a.triggered().await;
        token_b.triggered().await;
        assert!(token_a.is_triggered());
        assert!(token_b.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_controller_counts_as_shutdown() {
        let (controller, mut token) = ShutdownController::new();
        drop(controller);
        token.triggered().await;
    }

    #[tokio::test]
    async fn test_trigger_before_subscribe_is_not_lost() {
        let (controller, _token) = ShutdownController::new();
        controller.trigger();
        let late = controller.subscribe();
        assert!(late.is_triggered());
    }
}
