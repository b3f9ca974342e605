use parking_lot::Mutex;

use crate::storage::RawStorage;

type DeregisterHook = Box<dyn FnOnce() + Send>;

/// Storage for generated machine code.
///
/// Code registered with an unwinder must be deregistered before its bytes go
/// away, so hooks run (newest first) before the storage is freed.
pub(crate) struct ExecutableStorage {
    pub(crate) code: RawStorage,
    hooks: Mutex<Vec<DeregisterHook>>,
}

impl ExecutableStorage {
    pub(crate) fn new(code: RawStorage) -> Self {
        Self {
            code,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push_hook(&self, hook: DeregisterHook) {
        self.hooks.lock().push(hook);
    }
}

impl Drop for ExecutableStorage {
    fn drop(&mut self) {
        let hooks = std::mem::take(self.hooks.get_mut());
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }
}
