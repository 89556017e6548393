//! Feed record extractor: one parsed procurement-notice document in,
//! normalized tender drafts out.
//!
//! The documents are ATOM feeds whose entries carry the Spanish
//! public-procurement extension tree (`ContractFolderStatus` and friends).
//! Elements are matched by local name so any namespace prefix binding is
//! accepted. Every field lookup is optional: a missing intermediate node
//! yields the field's documented default, never an error, so one malformed
//! entry cannot fail a batch.

use itr_core::{deterministic_tender_id, TenderDraft, MISSING, NO_LINK, UNTITLED};
use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "itr-feed";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed document: {0}")]
    Parse(#[from] roxmltree::Error),
    #[error("document root <{0}> is not an ATOM feed")]
    NotAFeed(String),
}

/// Parse one feed document and extract a draft per entry.
///
/// Structurally invalid input (unparseable XML, a root element other than
/// `feed`) is a hard error; anything missing below the entry level degrades
/// to per-field defaults.
pub fn parse_feed(xml: &str) -> Result<Vec<TenderDraft>, FeedError> {
    let document = Document::parse(xml)?;
    let root = document.root_element();
    if root.tag_name().name() != "feed" {
        return Err(FeedError::NotAFeed(root.tag_name().name().to_string()));
    }

    let drafts: Vec<TenderDraft> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "entry")
        .map(extract_entry)
        .collect();
    debug!(entries = drafts.len(), "extracted feed document");
    Ok(drafts)
}

fn extract_entry(entry: Node) -> TenderDraft {
    let title = child_text(entry, "title")
        .unwrap_or(UNTITLED)
        .to_string();

    // Date portion of the updated timestamp, before the time separator.
    let date = child_text(entry, "updated")
        .map(|ts| ts.split('T').next().unwrap_or(ts))
        .unwrap_or(MISSING)
        .to_string();

    let status = child(entry, "ContractFolderStatus");

    let contracting_body = status
        .and_then(|s| descend(s, &["LocatedContractingParty", "Party", "PartyName", "Name"]))
        .and_then(element_text)
        .unwrap_or(MISSING)
        .to_string();

    let budget_amount = status
        .and_then(|s| descend(s, &["ProcurementProject", "BudgetAmount", "TaxExclusiveAmount"]))
        .and_then(element_text)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v >= 0.0)
        .unwrap_or(0.0);

    let cpv_code = status
        .and_then(|s| {
            descend(
                s,
                &["ProcurementProject", "RequiredCommodityClassification", "ItemClassificationCode"],
            )
        })
        .and_then(element_text)
        .unwrap_or_default()
        .to_string();

    let raw_status = status
        .and_then(|s| child_text(s, "ContractFolderStatusCode"))
        .map(str::to_string);

    // A feed may carry one or several <link> elements; the first href wins.
    let link = entry
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "link")
        .find_map(|n| n.attribute("href"))
        .unwrap_or(NO_LINK)
        .to_string();

    let id = child_text(entry, "id")
        .map(str::to_string)
        .unwrap_or_else(|| deterministic_tender_id(&title, &date, &contracting_body));

    TenderDraft {
        id,
        date,
        title,
        contracting_body,
        budget_amount,
        link,
        cpv_code,
        raw_status,
    }
}

fn child<'a, 'i>(node: Node<'a, 'i>, local_name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

fn descend<'a, 'i>(node: Node<'a, 'i>, path: &[&str]) -> Option<Node<'a, 'i>> {
    path.iter().try_fold(node, |n, name| child(n, name))
}

fn element_text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

fn child_text<'a>(node: Node<'a, '_>, local_name: &str) -> Option<&'a str> {
    child(node, local_name).and_then(element_text)
}
