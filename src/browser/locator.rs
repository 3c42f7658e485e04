use std::fmt;

use serde::Serialize;

use super::BrowserSession;

/// A way of finding an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Locator {
    /// CSS (or engine-extended CSS) selector.
    Css { selector: String },
    /// Element containing the given text.
    Text { text: String },
    /// ARIA role with an exact, case-insensitive accessible name.
    Role { role: String, name: String },
    /// `selector` resolved inside the first match of `parent`.
    Within {
        parent: Box<Locator>,
        selector: String,
    },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into() }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn within(&self, selector: impl Into<String>) -> Self {
        Locator::Within {
            parent: Box::new(self.clone()),
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css={selector}"),
            Locator::Text { text } => write!(f, "text={text}"),
            Locator::Role { role, name } => write!(f, "role={role}[name=\"{name}\"]"),
            Locator::Within { parent, selector } => write!(f, "{parent} >> {selector}"),
        }
    }
}

/// Click the first candidate that is present on the page.
///
/// Candidates are probed strictly in order. A candidate whose probe or click
/// fails is skipped rather than aborting the scan. Returns the index of the
/// candidate that was clicked.
pub async fn click_first_match(
    session: &mut dyn BrowserSession,
    candidates: &[Locator],
) -> Option<usize> {
    for (index, candidate) in candidates.iter().enumerate() {
        match session.count(candidate).await {
            Ok(0) => continue,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(locator = %candidate, error = %e, "Locator probe failed");
                continue;
            }
        }

        match session.click(candidate).await {
            Ok(()) => {
                tracing::debug!(locator = %candidate, "Clicked entry point");
                return Some(index);
            }
            Err(e) => {
                tracing::debug!(locator = %candidate, error = %e, "Click failed, trying next candidate");
            }
        }
    }

    None
}
