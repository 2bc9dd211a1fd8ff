use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Books,
    Games,
    Software,
    Other,
}

/// Checked in order; the first rule whose title phrase or key fragment matches wins.
const RULES: &[(&str, &str, Category)] = &[
    ("Book Bundle", "books", Category::Books),
    ("Game Bundle", "games", Category::Games),
    ("Software Bundle", "software", Category::Software),
];

impl Category {
    pub fn classify(title: &str, key: &str) -> Self {
        let key = key.to_lowercase();
        RULES
            .iter()
            .find(|(phrase, fragment, _)| title.contains(phrase) || key.contains(fragment))
            .map(|(_, _, category)| *category)
            .unwrap_or(Category::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Books => "Books",
            Category::Games => "Games",
            Category::Software => "Software",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_title_then_key() {
        assert_eq!(Category::classify("Humble Book Bundle: Rust", "/x"), Category::Books);
        assert_eq!(
            Category::classify("Tiny Worlds", "https://shop.example.com/games/tiny-worlds"),
            Category::Games
        );
        assert_eq!(Category::classify("Creator Pack", "/Software/creator"), Category::Software);
        assert_eq!(Category::classify("Portal 2", "p1:1"), Category::Other);
    }
}
