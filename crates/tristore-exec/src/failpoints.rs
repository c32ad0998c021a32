//! Chaos/failpoint hooks (feature: `failpoints`).
//!
//! The macro expands to nothing unless the feature is enabled. When enabled,
//! an armed point whose name starts with `panic_` panics the thread that
//! hits it, which is how worker panic propagation is exercised.

#[cfg(feature = "failpoints")]
static ARMED: parking_lot::Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

#[cfg(feature = "failpoints")]
pub fn arm(name: &str) {
    let mut armed = ARMED.lock();
    if !armed.iter().any(|n| n == name) {
        armed.push(name.to_string());
    }
}

#[cfg(feature = "failpoints")]
pub fn disarm(name: &str) {
    ARMED.lock().retain(|n| n != name);
}

#[cfg(feature = "failpoints")]
pub fn is_armed(name: &str) -> bool {
    ARMED.lock().iter().any(|n| n == name)
}

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let name: &str = $name;
        if name.starts_with("panic_") && $crate::failpoints::is_armed(name) {
            panic!("failpoint triggered: {}", name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        let _ = $name;
    };
}
