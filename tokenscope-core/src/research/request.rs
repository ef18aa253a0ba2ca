//! The caller's research request.

use serde::{Deserialize, Serialize};

/// Identifies the project to research. Only the name is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Social handle, with or without a leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

impl ResearchRequest {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Self::default()
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_social_handle(mut self, handle: impl Into<String>) -> Self {
        self.social_handle = Some(handle.into());
        self
    }

    pub fn with_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    /// Project name with surrounding whitespace removed.
    pub fn name(&self) -> &str {
        self.project_name.trim()
    }

    /// Website host without scheme, `www.` or path, if a website was given.
    pub fn website_domain(&self) -> Option<String> {
        let raw = self.website.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let host = url::Url::parse(&with_scheme).ok()?.host_str()?.to_lowercase();
        Some(host.trim_start_matches("www.").to_string())
    }

    /// Social handle with a single leading `@`.
    pub fn handle(&self) -> Option<String> {
        let h = self.social_handle.as_deref()?.trim().trim_start_matches('@');
        (!h.is_empty()).then(|| format!("@{}", h))
    }

    /// Free-form context lines for prompts.
    pub fn context_lines(&self) -> String {
        let mut lines = vec![format!("Project: {}", self.name())];
        if let Some(w) = self.website.as_deref().filter(|w| !w.trim().is_empty()) {
            lines.push(format!("Website: {}", w.trim()));
        }
        if let Some(h) = self.handle() {
            lines.push(format!("Social: {}", h));
        }
        if let Some(c) = self.contract_address.as_deref().filter(|c| !c.trim().is_empty()) {
            lines.push(format!("Contract: {}", c.trim()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_website_domain() {
        let req = ResearchRequest::new("Acme").with_website("https://www.Acme.io/docs");
        assert_eq!(req.website_domain().as_deref(), Some("acme.io"));
        let req = ResearchRequest::new("Acme").with_website("acme.io");
        assert_eq!(req.website_domain().as_deref(), Some("acme.io"));
        assert_eq!(ResearchRequest::new("Acme").website_domain(), None);
    }

    #[test]
    fn test_handle_normalized() {
        let req = ResearchRequest::new("Acme").with_social_handle("@@acme");
        assert_eq!(req.handle().as_deref(), Some("@acme"));
        let req = ResearchRequest::new("Acme").with_social_handle("  ");
        assert_eq!(req.handle(), None);
    }

    #[test]
    fn test_context_lines() {
        let req = ResearchRequest::new(" Acme ")
            .with_social_handle("acme")
            .with_contract_address("0xabc");
        assert_eq!(req.context_lines(), "Project: Acme\nSocial: @acme\nContract: 0xabc");
    }
}
