//! Emergency contact resolution.
//!
//! The dispatch service deduplicates recipients on its side; resolving here
//! too keeps the payload honest about who will actually be notified.

use serde::{Deserialize, Serialize};

/// Configured emergency recipients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactDirectory {
    /// Always-notified contacts, in priority order.
    pub contacts: Vec<String>,
    /// Optional primary number appended after the configured list.
    pub primary: Option<String>,
}

impl ContactDirectory {
    pub fn new(contacts: Vec<String>, primary: Option<String>) -> Self {
        Self { contacts, primary }
    }

    /// Resolve the final recipient list for one escalation: configured
    /// contacts, then the primary number, then `extra` (e.g. the intake
    /// form's emergency contacts). Blank entries are dropped; duplicates
    /// keep their first-seen position.
    pub fn resolve<'a, I>(&'a self, extra: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: Vec<String> = Vec::new();
        let candidates = self
            .contacts
            .iter()
            .map(String::as_str)
            .chain(self.primary.as_deref())
            .chain(extra);

        for number in candidates {
            let normalized = number.trim();
            if normalized.is_empty() {
                continue;
            }
            if !seen.iter().any(|n| n == normalized) {
                seen.push(normalized.to_string());
            }
        }
        seen
    }

    /// True when no recipient could ever be resolved from configuration
    /// alone.
    pub fn is_empty(&self) -> bool {
        self.contacts.iter().all(|c| c.trim().is_empty())
            && self.primary.as_deref().map_or(true, |p| p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_preserves_order_and_deduplicates() {
        let directory = ContactDirectory::new(
            vec!["+15550001".into(), "+15550002".into()],
            Some("+15550001".into()),
        );

        let resolved = directory.resolve(["+15550003", "+15550002"]);
        assert_eq!(resolved, vec!["+15550001", "+15550002", "+15550003"]);
    }

    #[test]
    fn resolve_drops_blank_entries() {
        let directory = ContactDirectory::new(vec!["  ".into(), "+15550009 ".into()], None);
        let resolved = directory.resolve(["", "  +15550009"]);
        assert_eq!(resolved, vec!["+15550009"]);
    }

    #[test]
    fn empty_directory_reports_empty() {
        assert!(ContactDirectory::default().is_empty());
        let configured = ContactDirectory::new(vec!["+15550001".into()], None);
        assert!(!configured.is_empty());
    }
}
