use std::io::{Cursor, Write};
use std::sync::Arc;

use itr_core::StatusLabel;
use itr_ingest::{IngestError, Ingestor};
use itr_query::{filter, FilterSpec};
use itr_storage::MemoryTenderStore;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const NS: &str = r#"xmlns="http://www.w3.org/2005/Atom"
    xmlns:cac="urn:dgpe:names:draft:codice:schema:xsd:CommonAggregateComponents-2"
    xmlns:cbc="urn:dgpe:names:draft:codice:schema:xsd:CommonBasicComponents-2"
    xmlns:cac-place-ext="urn:dgpe:names:draft:codice-place-ext:schema:xsd:CommonAggregateComponents-2""#;

fn entry(id: &str, title: &str, cpv: &str, budget: &str, status: &str) -> String {
    format!(
        r#"<entry>
          <id>{id}</id>
          <title>{title}</title>
          <updated>2026-03-14T09:30:00.000+01:00</updated>
          <link href="https://example.org/{id}.html"/>
          <cac-place-ext:ContractFolderStatus>
            <cbc:ContractFolderStatusCode>{status}</cbc:ContractFolderStatusCode>
            <cac-place-ext:LocatedContractingParty>
              <cac:Party><cac:PartyName><cbc:Name>Ministerio</cbc:Name></cac:PartyName></cac:Party>
            </cac-place-ext:LocatedContractingParty>
            <cac:ProcurementProject>
              <cac:BudgetAmount><cbc:TaxExclusiveAmount>{budget}</cbc:TaxExclusiveAmount></cac:BudgetAmount>
              <cac:RequiredCommodityClassification>
                <cbc:ItemClassificationCode>{cpv}</cbc:ItemClassificationCode>
              </cac:RequiredCommodityClassification>
            </cac:ProcurementProject>
          </cac-place-ext:ContractFolderStatus>
        </entry>"#
    )
}

fn feed(entries: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><feed {NS}>{entries}</feed>"#)
}

fn two_entry_feed() -> String {
    feed(&format!(
        "{}{}",
        entry("lic-72", "Soporte de sistemas", "72200000", "15000", "PUB"),
        entry("lic-45", "Obras de asfaltado", "45200000", "90000", "ADJ"),
    ))
}

fn zip_of(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(body.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip")
}

fn ingestor() -> Ingestor {
    Ingestor::new(Arc::new(MemoryTenderStore::new()))
}

#[tokio::test]
async fn end_to_end_import_then_it_filter() {
    let ingestor = ingestor();
    let outcome = ingestor
        .import_archive(zip_of(&[("marzo.atom", &two_entry_feed())]))
        .await
        .expect("import");

    assert_eq!(outcome.summary.documents, 1);
    assert_eq!(outcome.summary.extracted, 2);
    assert_eq!(outcome.summary.inserted, 2);
    assert_eq!(outcome.summary.updated, 0);

    let it_only = filter(
        &outcome.records,
        &FilterSpec {
            it_only: true,
            ..Default::default()
        },
    );
    assert_eq!(it_only.len(), 1);
    assert_eq!(it_only[0].id, "lic-72");
    assert_eq!(it_only[0].budget_amount, 15000.0);
    assert_eq!(it_only[0].status, StatusLabel::Announced);
}

#[tokio::test]
async fn reimport_is_idempotent() {
    let ingestor = ingestor();
    let first = ingestor
        .import_archive(zip_of(&[("marzo.atom", &two_entry_feed())]))
        .await
        .expect("first import");
    let second = ingestor
        .import_archive(zip_of(&[("marzo.atom", &two_entry_feed())]))
        .await
        .expect("second import");

    assert_eq!(first.records, second.records);
    assert_eq!(second.summary.inserted, 0);
    assert_eq!(second.summary.updated, 2);
}

#[tokio::test]
async fn reimport_refreshes_fields_but_preserves_favorites() {
    let ingestor = ingestor();
    ingestor
        .import_archive(zip_of(&[("v1.atom", &two_entry_feed())]))
        .await
        .expect("first import");

    let favorited = ingestor
        .toggle_favorite("lic-72", true)
        .await
        .expect("toggle")
        .expect("record exists");
    assert!(favorited.is_favorite);

    // Same id comes back awarded with a revised budget.
    let revised = feed(&entry("lic-72", "Soporte de sistemas", "72200000", "18500", "ADJ"));
    let outcome = ingestor
        .import_archive(zip_of(&[("v2.atom", &revised)]))
        .await
        .expect("second import");

    let merged = outcome
        .records
        .iter()
        .find(|r| r.id == "lic-72")
        .expect("merged record");
    assert_eq!(merged.budget_amount, 18500.0);
    assert_eq!(merged.status, StatusLabel::Awarded);
    assert!(merged.is_favorite, "favorite flag carries across re-import");
}

#[tokio::test]
async fn toggle_favorite_on_unknown_id_is_none() {
    let ingestor = ingestor();
    assert!(ingestor
        .toggle_favorite("nope", true)
        .await
        .expect("toggle")
        .is_none());
}

#[tokio::test]
async fn malformed_document_aborts_without_touching_the_store() {
    let ingestor = ingestor();
    ingestor
        .import_archive(zip_of(&[("ok.atom", &two_entry_feed())]))
        .await
        .expect("seed import");
    let before = ingestor.store().get_all().await.expect("read");

    let err = ingestor
        .import_archive(zip_of(&[
            ("nuevo.atom", &feed(&entry("lic-99", "Nueva", "72", "1", "PUB"))),
            ("roto.xml", "<feed><entry>"),
        ]))
        .await
        .expect_err("malformed document must abort");
    assert!(matches!(err, IngestError::DocumentParse { .. }));

    let after = ingestor.store().get_all().await.expect("read");
    assert_eq!(before, after, "aborted import must not persist anything");
}

#[tokio::test]
async fn non_feed_archive_entries_are_ignored() {
    let ingestor = ingestor();
    let outcome = ingestor
        .import_archive(zip_of(&[
            ("LEEME.txt", "esto no es un feed"),
            ("datos/marzo.atom", &two_entry_feed()),
        ]))
        .await
        .expect("import");
    assert_eq!(outcome.summary.documents, 1);
    assert_eq!(outcome.summary.extracted, 2);
}

#[tokio::test]
async fn unreadable_archive_is_an_archive_error() {
    let ingestor = ingestor();
    let err = ingestor
        .import_archive(Cursor::new(b"not a zip at all".to_vec()))
        .await
        .expect_err("garbage is not an archive");
    assert!(matches!(err, IngestError::ArchiveRead(_)));
}

#[tokio::test]
async fn clear_all_empties_the_store() {
    let ingestor = ingestor();
    ingestor
        .import_archive(zip_of(&[("marzo.atom", &two_entry_feed())]))
        .await
        .expect("import");
    ingestor.clear_all().await.expect("clear");
    assert!(ingestor.store().get_all().await.expect("read").is_empty());
}
