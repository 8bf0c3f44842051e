//! Environment lookup behind a trait so configuration can be tested without
//! touching the process environment.

use std::env::VarError;

pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Zero-sized type, delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryEnv;

#[cfg(any(test, feature = "test-support"))]
mod in_memory {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::env::VarError;

    use super::ReadEnv;

    /// Environment backed by a map; unset keys report `VarError::NotPresent`.
    #[derive(Default)]
    pub struct InMemoryEnv {
        vars: RefCell<HashMap<String, String>>,
    }

    impl InMemoryEnv {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, key: &str, value: &str) {
            self.vars
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
        }
    }

    impl ReadEnv for InMemoryEnv {
        fn var(&self, key: &str) -> Result<String, VarError> {
            self.vars
                .borrow()
                .get(key)
                .cloned()
                .ok_or(VarError::NotPresent)
        }
    }
}
