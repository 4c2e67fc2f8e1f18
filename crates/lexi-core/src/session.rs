//! Provider sessions per tab
//!
//! Each tab talks to its own [`ChatSession`], started on first use.
//! Resetting a tab drops its handle so the next send starts fresh.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ai::{ChatProvider, ChatSession};
use crate::workspace::TabId;

/// Live provider sessions, at most one per tab.
///
/// Sessions are created lazily on the first send and dropped on any
/// context change. Dropping an entry does not stop a reply already
/// streaming from it; the exchange holds its own handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<TabId, Arc<dyn ChatSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_start(
        &mut self,
        tab: TabId,
        provider: &dyn ChatProvider,
        system_instruction: &str,
    ) -> Arc<dyn ChatSession> {
        self.sessions
            .entry(tab)
            .or_insert_with(|| {
                info!(%tab, provider = provider.name(), "starting provider session");
                provider.start_session(system_instruction)
            })
            .clone()
    }

    /// Drops the tab's session; returns whether one existed.
    pub fn reset(&mut self, tab: TabId) -> bool {
        let existed = self.sessions.remove(&tab).is_some();
        if existed {
            info!(%tab, "provider session reset");
        }
        existed
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn contains(&self, tab: TabId) -> bool {
        self.sessions.contains_key(&tab)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ScriptedProvider;

    #[test]
    fn test_session_reused_until_reset() {
        let provider = ScriptedProvider::new();
        let mut registry = SessionRegistry::new();
        let tab = TabId::new();

        let first = registry.get_or_start(tab, &provider, "sys");
        let again = registry.get_or_start(tab, &provider, "sys");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(provider.sessions_started(), 1);

        assert!(registry.reset(tab));
        assert!(!registry.reset(tab));
        let fresh = registry.get_or_start(tab, &provider, "sys");
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(provider.sessions_started(), 2);
    }

    #[test]
    fn test_sessions_are_per_tab() {
        let provider = ScriptedProvider::new();
        let mut registry = SessionRegistry::new();
        let (a, b) = (TabId::new(), TabId::new());
        registry.get_or_start(a, &provider, "sys");
        registry.get_or_start(b, &provider, "sys");
        assert_eq!(registry.len(), 2);

        registry.reset(a);
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
    }
}
