//! Feature-gated fault injection for the file-fold protocol.
//!
//! Compile with `--features failpoints` to enable injection. Without the
//! feature, the `fp!()` macro expands to an `Ok(())` constant.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// What a triggered failpoint does.
#[derive(Clone, Debug)]
pub enum Action {
    /// No-op (default).
    Off,
    /// Fail with an I/O error carrying the given message.
    Error(String),
    /// Panic with the given message.
    Panic(String),
    /// Abort the process, simulating a hard crash.
    Abort,
}

/// Thread-safe global registry of active failpoints.
static REGISTRY: LazyLock<Mutex<HashMap<&'static str, Action>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Set a failpoint action.
///
/// # Panics
///
/// Panics if the internal registry mutex is poisoned.
pub fn set(name: &'static str, action: Action) {
    REGISTRY.lock().unwrap().insert(name, action);
}

/// Clear a specific failpoint.
///
/// # Panics
///
/// Panics if the internal registry mutex is poisoned.
pub fn clear(name: &'static str) {
    REGISTRY.lock().unwrap().remove(name);
}

/// Clear all failpoints.
///
/// # Panics
///
/// Panics if the internal registry mutex is poisoned.
pub fn clear_all() {
    REGISTRY.lock().unwrap().clear();
}

/// Look up a failpoint and execute its action.
///
/// # Errors
///
/// Returns the configured message when the action is `Error`.
///
/// # Panics
///
/// Panics if the internal registry mutex is poisoned, or if the failpoint
/// action is `Panic`.
pub fn check(name: &str) -> Result<(), String> {
    let registry = REGISTRY.lock().unwrap();
    match registry.get(name) {
        None | Some(Action::Off) => Ok(()),
        Some(Action::Error(msg)) => Err(msg.clone()),
        Some(Action::Panic(msg)) => panic!("failpoint {name}: {msg}"),
        Some(Action::Abort) => std::process::abort(),
    }
}

/// Failpoint injection point.
///
/// With the `failpoints` feature: checks the registry and may return an
/// `std::io::Error` or panic. Without it: compiles to `Ok(())`.
///
/// Usage: `fp!("FP_FOLD_INSTALL_BASE")?;`
#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        $crate::failpoints::check($name)
            .map_err(|msg| std::io::Error::other(format!("failpoint {}: {}", $name, msg)))
    };
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        Ok::<(), std::io::Error>(())
    };
}
