//! Per-request state.
//!
//! A [`RequestContext`] is built once per request and dropped with it. It
//! carries the module id, the active locale and its translator, the lazily
//! loaded module params and the queue of user-facing notices.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::params::ModuleParams;
use crate::store::{ConfigStore, StoreError};
use crate::translate::{Catalog, Translator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A dismissible banner for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Notices queued while handling a request.
///
/// Shared by reference between concurrent fetches, hence the lock.
#[derive(Debug, Default)]
pub struct Notices {
    queue: Mutex<Vec<Notice>>,
}

impl Notices {
    pub fn push(&self, level: NoticeLevel, message: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(Notice {
                level,
                message: message.into(),
            });
        }
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message);
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.queue.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Notice> {
        self.queue
            .lock()
            .map(|mut q| std::mem::take(&mut *q))
            .unwrap_or_default()
    }
}

/// The logged-in user as reported by the host. Id `0` is a guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: u64,
}

impl CurrentUser {
    pub fn is_guest(&self) -> bool {
        self.id == 0
    }
}

pub struct RequestContext {
    pub module_id: i64,
    pub locale: String,
    pub user: CurrentUser,
    pub notices: Notices,
    pub translator: Arc<dyn Translator>,
    params: Option<ModuleParams>,
}

impl RequestContext {
    pub fn new(module_id: i64, locale: impl Into<String>) -> Self {
        Self {
            module_id,
            locale: locale.into(),
            user: CurrentUser::default(),
            notices: Notices::default(),
            translator: Arc::new(Catalog::builtin()),
            params: None,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = user;
        self
    }

    /// Seeds the params when the host already handed them over.
    pub fn with_params(mut self, params: ModuleParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Returns the module params, reading them from `store` on first use.
    pub fn params(&mut self, store: &dyn ConfigStore) -> Result<&mut ModuleParams, StoreError> {
        if self.params.is_none() {
            debug!("Loading params for module {}", self.module_id);
            self.params = Some(store.load(self.module_id)?);
        }
        match self.params.as_mut() {
            Some(params) => Ok(params),
            None => Err(StoreError::NotFound(self.module_id)),
        }
    }

    /// Params already loaded for this request, if any.
    pub fn cached_params(&self) -> Option<&ModuleParams> {
        self.params.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        loads: AtomicUsize,
    }

    impl ConfigStore for CountingStore {
        fn load(&self, _module_id: i64) -> Result<ModuleParams, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(ModuleParams::from_json(r#"{"location":"de-DE"}"#)?)
        }

        fn write_location(&self, _: i64, _: &str, _: Option<bool>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn params_load_once_per_request() {
        let store = CountingStore {
            loads: AtomicUsize::new(0),
        };
        let mut ctx = RequestContext::new(1, "en-UK");
        assert!(ctx.cached_params().is_none());

        assert_eq!(ctx.params(&store).unwrap().location().as_deref(), Some("de-DE"));
        ctx.params(&store).unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        let mut next = RequestContext::new(1, "en-UK");
        next.params(&store).unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notices_drain_in_order() {
        let notices = Notices::default();
        notices.warning("first");
        notices.success("second");

        let drained = notices.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Warning);
        assert_eq!(drained[1].message, "second");
        assert!(notices.snapshot().is_empty());
    }
}
