//! Listing page extraction
//!
//! A listing page holds the `table.ergebnisListe` result table. Each data row
//! has at least four cells: advisor name, company, location and a cell with
//! the link to the advisor's detail page.

use crate::crawler::parser::{
    element_text, query_value, resolve_link, selector, split_postal_code,
};
use crate::record::{normalize_text, ListingSummary};
use crate::ExtractError;
use scraper::{ElementRef, Html};
use url::Url;

const RESULTS_TABLE: &str = "table.ergebnisListe";
const NO_RESULTS_CLASS: &str = ".keineErgebnisse";
const NO_RESULTS_TEXT: &str = "keine ergebnisse";

/// Complete (lowercased) texts of a pager link to the following page
const NEXT_PAGE_TEXTS: [&str; 8] = [
    "»",
    ">",
    "weiter",
    "weiter »",
    "weiter >",
    "nächste",
    "nächste seite",
    "nächste »",
];

/// Extracted content of one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Entries in listing order
    pub entries: Vec<ListingSummary>,

    /// Whether the page links to a further page
    pub has_next: bool,
}

impl ListingPage {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses a listing page into summaries and a next-page indicator
///
/// # Empty pages
///
/// An empty page is only recognized by an explicit marker: either the
/// results table with no data rows, or the "no results" notice (an element
/// with class `keineErgebnisse`, or the text "Keine Ergebnisse"). A page with
/// neither is an error page and yields `ExtractError::StructureMismatch`.
///
/// # Example
///
/// ```
/// use bafa_harvest::crawler::parse_listing;
/// use url::Url;
///
/// let html = r#"<table class="ergebnisListe">
///   <tr><th>Name</th><th>Firma</th><th>Ort</th><th></th></tr>
///   <tr><td>Max Muster</td><td>Muster GmbH</td><td>10115 Berlin</td>
///       <td><a href="detail?id=7">Details</a></td></tr>
/// </table>"#;
/// let base = Url::parse("https://example.com/portal/list").unwrap();
/// let page = parse_listing(html, &base).unwrap();
/// assert_eq!(page.entries.len(), 1);
/// assert_eq!(page.entries[0].city.as_deref(), Some("Berlin"));
/// assert_eq!(page.entries[0].bfee_id.as_deref(), Some("7"));
/// ```
pub fn parse_listing(html: &str, page_url: &Url) -> Result<ListingPage, ExtractError> {
    let document = Html::parse_document(html);

    let table_selector = selector(RESULTS_TABLE)?;
    let Some(table) = document.select(&table_selector).next() else {
        if has_no_results_marker(&document)? {
            return Ok(ListingPage::default());
        }
        return Err(ExtractError::StructureMismatch(format!(
            "neither {} nor a no-results marker found",
            RESULTS_TABLE
        )));
    };

    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;
    let link_selector = selector("a[href]")?;

    let mut entries = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < 4 {
            // Header rows use <th>, spacer rows have fewer cells
            continue;
        }

        let detail_url = cells[3]
            .select(&link_selector)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve_link(href, page_url));

        let location = element_text(cells[2]);
        let (postal_code, city) = match location.as_deref().map(split_postal_code) {
            Some((postal_code, city)) => (postal_code.map(String::from), normalize_text(city)),
            None => (None, None),
        };

        entries.push(ListingSummary {
            name: element_text(cells[0]),
            company: element_text(cells[1]),
            postal_code,
            city,
            bfee_id: detail_url.as_ref().and_then(|url| query_value(url, "id")),
            detail_url: detail_url.map(String::from),
        });
    }

    Ok(ListingPage {
        entries,
        has_next: has_next_link(&document)?,
    })
}

/// Checks for the explicit "no results" notice
fn has_no_results_marker(document: &Html) -> Result<bool, ExtractError> {
    if document.select(&selector(NO_RESULTS_CLASS)?).next().is_some() {
        return Ok(true);
    }

    let text = document.root_element().text().collect::<String>();
    let text = normalize_text(&text).unwrap_or_default().to_lowercase();
    Ok(text.contains(NO_RESULTS_TEXT))
}

/// Checks for a link to the following page
///
/// Recognized forms: `rel="next"`, class `next`, or a link whose whole text
/// is one of [`NEXT_PAGE_TEXTS`]. Links that merely start with "weiter", such
/// as "Weitere Informationen", do not count.
fn has_next_link(document: &Html) -> Result<bool, ExtractError> {
    let anchor_selector = selector("a[href]")?;

    Ok(document.select(&anchor_selector).any(|a| {
        let element = a.value();

        let rel_next = element
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("next")));
        let class_next = element.classes().any(|c| c.eq_ignore_ascii_case("next"));

        let text = element_text(a).unwrap_or_default().to_lowercase();
        let text_next = NEXT_PAGE_TEXTS.contains(&text.as_str());

        rel_next || class_next || text_next
    }))
}
