//! Ranked lookup strategies: each field lists its locators best-first and the
//! first one that yields a non-empty value wins.

use crate::page::Element;

pub type PostFn = fn(&str) -> Option<String>;
pub type DeriveFn = fn(&Element) -> Option<String>;

#[derive(Clone, Copy)]
pub enum Locator {
    /// Text of the first matching element with any text.
    Text(&'static str),
    /// Attribute of the first matching element carrying it.
    Attr {
        selector: &'static str,
        attr: &'static str,
    },
    /// Computed from the whole container.
    Derived {
        label: &'static str,
        derive: DeriveFn,
    },
}

#[derive(Clone, Copy)]
pub struct Strategy {
    pub locator: Locator,
    pub post: Option<PostFn>,
}

impl Strategy {
    pub const fn text(selector: &'static str) -> Self {
        Self {
            locator: Locator::Text(selector),
            post: None,
        }
    }

    pub const fn attr(selector: &'static str, attr: &'static str) -> Self {
        Self {
            locator: Locator::Attr { selector, attr },
            post: None,
        }
    }

    pub const fn derived(label: &'static str, derive: DeriveFn) -> Self {
        Self {
            locator: Locator::Derived { label, derive },
            post: None,
        }
    }

    /// Post-processes the raw value; returning `None` rejects it.
    pub const fn then(mut self, post: PostFn) -> Self {
        self.post = Some(post);
        self
    }

    pub fn describe(&self) -> String {
        match self.locator {
            Locator::Text(selector) => selector.to_string(),
            Locator::Attr { selector, attr } => format!("{}@{}", selector, attr),
            Locator::Derived { label, .. } => format!("<{}>", label),
        }
    }
}

pub struct FieldSpec {
    pub name: &'static str,
    pub strategies: Vec<Strategy>,
}

impl FieldSpec {
    pub fn new(name: &'static str, strategies: Vec<Strategy>) -> Self {
        Self { name, strategies }
    }
}

/// A multi-valued field: the first selector matching any non-empty text wins.
pub struct ListSpec {
    pub name: &'static str,
    pub selectors: Vec<&'static str>,
}

impl ListSpec {
    pub fn new(name: &'static str, selectors: Vec<&'static str>) -> Self {
        Self { name, selectors }
    }
}

// Common post-processing steps.

pub fn first_line(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

pub fn strip_quotes(raw: &str) -> Option<String> {
    let cleaned = raw.replace('"', "");
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
