use super::Target;
use crate::log_warn;
use crate::model::{Item, UNKNOWN};
use crate::page::Element;
use crate::scraper::strategy::strip_quotes;
use crate::scraper::{infer_keyword, FieldSpec, FieldValue, Scraper, Strategy};

/// Checked in order against the row markup; the first hit wins.
const PLATFORMS: &[(&str, &str)] = &[
    ("steam", "Steam"),
    ("gog", "GOG"),
    ("origin", "Origin"),
    ("uplay", "Uplay"),
    ("epic", "Epic Games Store"),
    ("microsoft", "Microsoft Store"),
];

pub const REDEEMED: &str = "Redeemed";
pub const UNREDEEMED: &str = "Unredeemed";

/// The key vault: one table row per game key, paginated with a chevron control.
pub struct KeysTarget {
    title: FieldSpec,
    key_value: FieldSpec,
}

impl Default for KeysTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl KeysTarget {
    pub fn new() -> Self {
        Self {
            title: FieldSpec::new(
                "title",
                vec![
                    Strategy::text("td.game-name h4").then(strip_quotes),
                    Strategy::text("h4").then(strip_quotes),
                    Strategy::attr("[data-title]", "data-title").then(strip_quotes),
                ],
            ),
            key_value: FieldSpec::new(
                "key",
                vec![
                    Strategy::text(".keyfield-value").then(strip_quotes),
                    Strategy::attr(".keyfield", "title").then(strip_quotes),
                ],
            ),
        }
    }
}

impl Target for KeysTarget {
    fn name(&self) -> &'static str {
        "keys"
    }

    fn ready_selector(&self) -> &'static str {
        "td.js-redeemer-cell"
    }

    fn container_selector(&self) -> &'static str {
        "tr"
    }

    fn reveal_selectors(&self) -> &'static [&'static str] {
        &[
            ".js-pagination-holder .pagination .jump-to-page:not(.current) i.hb-chevron-right",
            ".pagination i.hb-chevron-right",
            ".pagination a.next",
        ]
    }

    fn columns(&self) -> &'static [&'static str] {
        &["title", "key", "status", "platform"]
    }

    fn extract(&self, row: &Element, page: usize, slot: usize) -> Option<Item> {
        // Header and spacer rows carry no redeemer cell.
        let cells = row.select("td.js-redeemer-cell").ok()?;
        let redeemer = cells.first()?;

        let item_key = format!("p{}:{}", page, slot);
        let scraper = Scraper::element(row);
        let content = scraper.content();

        let FieldValue::Found { value: title, .. } = content.field(&self.title) else {
            log_warn!("[keys] Skipping row {}: no title found", item_key);
            return None;
        };

        let keyfield = redeemer
            .select(".keyfield")
            .ok()
            .and_then(|found| found.into_iter().next());

        let (status, key) = match keyfield {
            Some(field) if field.has_class("redeemed") => {
                (REDEEMED, content.field_or_unknown(&self.key_value, &item_key))
            }
            Some(_) => (UNREDEEMED, UNREDEEMED.to_string()),
            None => {
                log_warn!("[keys] No keyfield in row {} ({})", item_key, title);
                (UNKNOWN, UNKNOWN.to_string())
            }
        };

        Some(
            Item::new(item_key, page)
                .with_field("title", title)
                .with_field("key", key)
                .with_field("status", status)
                .with_field("platform", infer_keyword(&row.html, PLATFORMS, UNKNOWN)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn rows(html: &str) -> Vec<Element> {
        let document = Html::parse_document(&format!("<table><tbody>{}</tbody></table>", html));
        document
            .select(&Selector::parse("tr").unwrap())
            .map(Element::from_ref)
            .collect()
    }

    #[test]
    fn reads_redeemed_and_unredeemed_rows() {
        let rows = rows(
            r#"<tr><td class="game-name"><h4>"Portal 2"</h4></td>
                   <td class="js-redeemer-cell redeemer-cell">
                     <div class="js-keyfield keyfield redeemed"><div class="keyfield-value">AAAA-BBBB</div></div>
                     <i class="hb-steam"></i></td></tr>
               <tr><td class="game-name"><h4>Heretic</h4></td>
                   <td class="js-redeemer-cell redeemer-cell">
                     <div class="js-keyfield keyfield"><div class="keyfield-value">Reveal your GOG key</div></div>
                   </td></tr>"#,
        );
        let target = KeysTarget::new();

        let first = target.extract(&rows[0], 1, 1).unwrap();
        assert_eq!(first.key, "p1:1");
        assert_eq!(first.title(), "Portal 2");
        assert_eq!(first.field("status"), Some(REDEEMED));
        assert_eq!(first.field("key"), Some("AAAA-BBBB"));
        assert_eq!(first.field("platform"), Some("Steam"));

        let second = target.extract(&rows[1], 1, 2).unwrap();
        assert_eq!(second.field("status"), Some(UNREDEEMED));
        assert_eq!(second.field("key"), Some(UNREDEEMED));
        assert_eq!(second.field("platform"), Some("GOG"));
    }

    #[test]
    fn missing_keyfield_reads_as_unknown() {
        let rows = rows(
            r#"<tr><td class="game-name"><h4>Mystery</h4></td>
                   <td class="js-redeemer-cell"><span>expired</span></td></tr>"#,
        );
        let item = KeysTarget::new().extract(&rows[0], 3, 7).unwrap();
        assert_eq!(item.key, "p3:7");
        assert_eq!(item.field("status"), Some(UNKNOWN));
        assert_eq!(item.field("platform"), Some(UNKNOWN));
    }

    #[test]
    fn skips_rows_without_title_or_redeemer() {
        let rows = rows(
            r#"<tr><th>Game</th><th>Key</th></tr>
               <tr><td class="game-name"></td><td class="js-redeemer-cell"><div class="keyfield"></div></td></tr>"#,
        );
        let target = KeysTarget::new();
        assert!(target.extract(&rows[0], 1, 1).is_none());
        assert!(target.extract(&rows[1], 1, 2).is_none());
    }
}
