use std::collections::HashSet;

use common::config::ProjectConfig;

/// Decides which team members are left out of classification and reports.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    logins: HashSet<String>,
    email_suffix: Option<String>,
}

impl ExclusionFilter {
    pub fn new<I, S>(logins: I, email_suffix: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            logins: logins
                .into_iter()
                .map(|login| login.as_ref().trim().to_ascii_lowercase())
                .filter(|login| !login.is_empty())
                .collect(),
            email_suffix: email_suffix
                .map(|suffix| suffix.trim().to_ascii_lowercase())
                .filter(|suffix| !suffix.is_empty()),
        }
    }

    pub fn from_config(project: &ProjectConfig) -> Self {
        Self::new(project.excluded_logins(), project.email_suffix_filter.as_deref())
    }

    /// Logins compare case-insensitively. A member whose email is known and
    /// does not end with the configured suffix is excluded; unknown emails pass.
    pub fn is_excluded(&self, login: &str, email: Option<&str>) -> bool {
        if self.logins.contains(&login.to_ascii_lowercase()) {
            return true;
        }
        match (&self.email_suffix, email) {
            (Some(suffix), Some(email)) => !email.trim().to_ascii_lowercase().ends_with(suffix),
            _ => false,
        }
    }

    pub fn excluded_logins(&self) -> Vec<String> {
        let mut logins: Vec<_> = self.logins.iter().cloned().collect();
        logins.sort();
        logins
    }

    pub fn email_suffix(&self) -> Option<&str> {
        self.email_suffix.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_matching_ignores_case_and_blanks() {
        let filter = ExclusionFilter::new([" Dependabot ", "", "alice"], None);
        assert!(filter.is_excluded("dependabot", None));
        assert!(filter.is_excluded("ALICE", Some("alice@acme.dev")));
        assert!(!filter.is_excluded("bob", None));
        assert_eq!(filter.excluded_logins(), vec!["alice", "dependabot"]);
    }

    #[test]
    fn email_suffix_only_applies_to_known_emails() {
        let filter = ExclusionFilter::new(Vec::<String>::new(), Some("@acme.dev"));
        assert!(!filter.is_excluded("bob", Some("Bob@ACME.dev")));
        assert!(filter.is_excluded("eve", Some("eve@gmail.com")));
        assert!(!filter.is_excluded("carol", None));
    }
}
