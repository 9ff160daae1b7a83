//! Cooperative cancellation and the always-on abort listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared cancellation flag, set from any thread and polled at defined
/// checkpoints (per event in the player, per drain in the recorder).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm before a new session. Only the session owner calls this.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Session teardown run when the switch fires, beyond cancelling the token.
pub type AbortHook = Arc<dyn Fn() + Send + Sync>;

/// Process-wide kill switch. Installed once at startup, independent of
/// recorder/player lifecycle; firing with no active session is a no-op
/// because the token is only observed by running sessions. An optional
/// abort hook tears down state the token alone cannot reach, such as an
/// armed recording.
pub struct KillSwitch {
    token: CancelToken,
    hook: Option<AbortHook>,
    #[cfg(target_os = "macos")]
    _listener: Option<crate::platform::HotkeyListener>,
}

impl KillSwitch {
    /// Install the global abort listener for `token`. On macOS this is a
    /// listen-only event tap watching the Escape key; elsewhere there is no
    /// global hook and callers wire their own signal (the CLI uses Ctrl+C)
    /// into the same token.
    pub fn install(token: CancelToken) -> Self {
        Self::with_hook(token, None)
    }

    /// Install and additionally run `abort` whenever the switch fires,
    /// from the hotkey listener as well as from [`KillSwitch::engage`].
    /// Wire `MacroEngine::abort_all` here so firing the switch also stops
    /// an active recording.
    pub fn install_with_abort(
        token: CancelToken,
        abort: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::with_hook(token, Some(Arc::new(abort)))
    }

    fn with_hook(token: CancelToken, hook: Option<AbortHook>) -> Self {
        #[cfg(target_os = "macos")]
        {
            let listener =
                match crate::platform::HotkeyListener::spawn(token.clone(), hook.clone()) {
                    Ok(l) => Some(l),
                    Err(e) => {
                        tracing::warn!(error = %e, "kill switch hook unavailable");
                        None
                    }
                };
            Self {
                token,
                hook,
                _listener: listener,
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            Self { token, hook }
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Manually trip the switch.
    pub fn engage(&self) {
        info!("kill switch engaged");
        self.token.cancel();
        if let Some(hook) = &self.hook {
            hook();
        }
    }
}
