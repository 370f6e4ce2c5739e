//! Document lifecycle: create, open, save after every change

use pretty_assertions::assert_eq;
use xlcells::prelude::*;
use xlcells::{CoreError, NaiveDate, Workbook, XlsxReader, XlsxWriter};

fn scratch() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn test_create_writes_one_sheet() {
    let dir = scratch();
    let path = dir.path().join("new.xlsx");

    let doc = Document::create(&path, false).unwrap();
    assert!(path.is_file());
    assert_eq!(doc.sheet_names(), vec!["Sheet1"]);
    assert!(doc.shared_strings().is_empty());

    let (workbook, _) = XlsxReader::read_file(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Sheet1"]);
}

#[test]
fn test_create_with_custom_sheet_name() {
    let dir = scratch();
    let path = dir.path().join("named.xlsm");
    let options = DocumentOptions::new()
        .default_sheet_name("Summary")
        .write(XlsxWriteOptions::new().compression(Compression::Stored));

    let doc = Document::create_with_options(&path, false, options).unwrap();
    assert_eq!(doc.sheet_names(), vec!["Summary"]);
    assert_eq!(doc.options().write.compression, Compression::Stored);
}

#[test]
fn test_create_refuses_to_overwrite() {
    let dir = scratch();
    let path = dir.path().join("exists.xlsx");
    std::fs::write(&path, b"not a package").unwrap();

    let err = Document::create(&path, false).unwrap_err();
    assert!(matches!(err, Error::OverwriteRefused(_)));
    assert_eq!(std::fs::read(&path).unwrap(), b"not a package".to_vec());

    let doc = Document::create(&path, true).unwrap();
    assert_eq!(doc.sheet_names(), vec!["Sheet1"]);
}

#[test]
fn test_path_errors() {
    let dir = scratch();

    let missing = dir.path().join("missing.xlsx");
    assert!(matches!(Document::open(&missing), Err(Error::Path { .. })));

    let wrong = dir.path().join("data.csv");
    std::fs::write(&wrong, b"a,b").unwrap();
    assert!(matches!(Document::open(&wrong), Err(Error::Path { .. })));
    assert!(matches!(
        Document::create(dir.path().join("new.ods"), true),
        Err(Error::Path { .. })
    ));
}

#[test]
fn test_open_rejects_non_package() {
    let dir = scratch();
    let path = dir.path().join("broken.xlsx");
    std::fs::write(&path, b"plain text").unwrap();

    assert!(matches!(Document::open(&path), Err(Error::Xlsx(_))));
}

#[test]
fn test_every_write_is_saved() {
    let dir = scratch();
    let path = dir.path().join("saved.xlsx");
    let mut doc = Document::create(&path, false).unwrap();

    doc.set_cell("Sheet1", "A1", "label").unwrap();
    doc.set_cell("Sheet1", "B1", 12.5).unwrap();
    doc.set_cell("Sheet1", "C1", true).unwrap();
    let when = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    doc.set_cell("Sheet1", "D1", when).unwrap();
    doc.add_sheet("Second").unwrap();
    doc.set_cell("Second", "ZZ100", "far").unwrap();

    // No explicit save: reopening sees every change
    let mut reopened = Document::open(&path).unwrap();
    assert_eq!(reopened.sheet_names(), vec!["Sheet1", "Second"]);

    let a1 = reopened.find_cell("Sheet1", "A1").unwrap();
    let b1 = reopened.find_cell("Sheet1", "B1").unwrap();
    let c1 = reopened.find_cell("Sheet1", "C1").unwrap();
    let d1 = reopened.find_cell("Sheet1", "D1").unwrap();
    let far = reopened.find_cell_by_reference("Second!$ZZ$100").unwrap();

    assert_eq!(reopened.cell_value(a1), Some(CellValue::string("label")));
    assert_eq!(reopened.cell_value(b1), Some(CellValue::Number(12.5)));
    assert_eq!(reopened.cell_value(c1), Some(CellValue::Boolean(true)));
    assert_eq!(reopened.cell_value(d1), Some(CellValue::Date(when)));
    assert_eq!(reopened.cell(d1).unwrap().kind(), CellKind::Date);
    assert_eq!(reopened.cell_value(far), Some(CellValue::string("far")));
    assert_eq!(reopened.shared_strings(), vec!["label", "far"]);
}

#[test]
fn test_failed_write_leaves_file_untouched() {
    let dir = scratch();
    let path = dir.path().join("stable.xlsx");
    let mut doc = Document::create(&path, false).unwrap();
    doc.set_cell("Sheet1", "A1", "kept").unwrap();
    let before = std::fs::read(&path).unwrap();

    assert!(matches!(
        doc.set_cell("Sheet1", "A1", f64::NAN),
        Err(Error::Core(CoreError::InvalidNumber(_)))
    ));
    assert!(doc.set_cell("Other", "A1", "x").is_err());
    assert!(doc.add_sheet("sheet1").is_err());
    assert!(doc.find_cell("Sheet1", "A0").is_err());

    assert_eq!(std::fs::read(&path).unwrap(), before);
    let a1 = doc.find_cell("Sheet1", "A1").unwrap();
    assert_eq!(doc.cell_value(a1), Some(CellValue::string("kept")));
}

#[test]
fn test_purge_on_open() {
    let dir = scratch();
    let path = dir.path().join("purge.xlsx");
    let mut doc = Document::create(&path, false).unwrap();
    doc.set_cell("Sheet1", "A1", "x").unwrap();
    drop(doc);

    // Leave an entry behind that no cell references
    let (workbook, package) = XlsxReader::read_file(&path).unwrap();
    let mut stale = workbook.shared_strings().clone();
    stale.insert("orphan");
    let sheets = workbook.worksheets().cloned().collect();
    let workbook =
        Workbook::from_parts(sheets, stale, package.reserved_relationship_ids()).unwrap();
    XlsxWriter::write_file(&workbook, &package, &path).unwrap();

    let doc = Document::open(&path).unwrap();
    assert_eq!(doc.unreferenced_strings(), vec![1]);

    let options = DocumentOptions::new().purge_unreferenced_on_open(true);
    let doc = Document::open_with_options(&path, options).unwrap();
    assert_eq!(doc.shared_strings(), vec!["x"]);
    assert!(Document::open(&path).unwrap().unreferenced_strings().is_empty());
}
