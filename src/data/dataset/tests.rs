#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;

    use crate::data::{
        ArrayStore, ChunkLayout, Dataset, DatasetInfo, Datum, GroupMetadata, Image, MemoryStore, Modality, ModalityRegistry,
        StorageKind, Table, Value, WritableStore,
    };
    use crate::utils::fixtures::{self, ROWS};
    use crate::{Error, StorageError, ValidationError};

    fn registry() -> Arc<ModalityRegistry> {
        Arc::new(ModalityRegistry::default())
    }

    fn open(layout: ChunkLayout) -> Dataset {
        fixtures::init_logging();
        Dataset::open_store(Arc::new(fixtures::archive(layout)), registry()).unwrap()
    }

    #[test]
    fn construct() {
        let dataset = fixtures::freesolv();
        assert_eq!(dataset.name(), "freesolv");
        assert_eq!(dataset.size(), ROWS);
        assert_eq!(dataset.column_names(), ["smiles", "expt", "calc"]);
        assert_eq!(dataset.modality("smiles").unwrap(), Modality::Molecule);
        assert_eq!(dataset.modality("expt").unwrap(), Modality::Scalar);
        assert_eq!(dataset.column_kind("expt").unwrap(), StorageKind::Float);
        assert_eq!(dataset.annotations().len(), 1);

        match dataset.get_data(1, "smiles").unwrap() {
            Datum::Molecule(m) => assert_eq!(m.smiles(), "c1ccccc1"),
            other => panic!("expected a molecule, got {other:?}"),
        }
        assert_eq!(dataset.get_data(90, "expt").unwrap().as_f64(), Some(fixtures::expt(90)));
    }

    #[test]
    fn every_value_loads_with_its_modality() {
        let memory = fixtures::freesolv();
        let chunked = open(ChunkLayout::PerRow);

        for dataset in [memory.as_ref(), &chunked] {
            for column in dataset.column_names() {
                let modality = dataset.modality(column).unwrap();
                for row in 0..dataset.size() {
                    let datum = dataset.get_data(row, column).unwrap();
                    assert_eq!(datum.modality(), modality, "{column}[{row}]");
                }
            }
        }
    }

    #[test]
    fn annotation_mismatch() {
        let err = Dataset::builder("bad")
            .table(fixtures::freesolv_table())
            .annotate("expt", Modality::Molecule)
            .build(registry())
            .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::AnnotationMismatch {
                column: "expt".into(),
                annotated: Modality::Molecule,
                stored: StorageKind::Float,
            })
        );

        let err = Dataset::builder("bad")
            .table(fixtures::freesolv_table())
            .annotate("fingerprint", Modality::Array)
            .build(registry())
            .unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::ColumnNotFound("fingerprint".into())));
    }

    #[test]
    fn rejected_values_name_row_and_column() {
        let table = Table::new().with_column("smiles", ["CCO", "C(C", "CC"]).unwrap();
        let err = Dataset::new(
            table,
            DatasetInfo::new("bad", "", ""),
            [("smiles".to_string(), Modality::Molecule)].into_iter().collect(),
            registry(),
        )
        .unwrap_err();
        match err {
            Error::Storage(StorageError::ModalityLoad { column, row, .. }) => {
                assert_eq!(column, "smiles");
                assert_eq!(row, 1);
            }
            other => panic!("expected a modality load error, got {other}"),
        }
    }

    #[test]
    fn out_of_range() {
        let dataset = fixtures::freesolv();
        let err = dataset.get_data(ROWS, "expt").unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::IndexOutOfRange { index: ROWS, length: ROWS, .. })
        ));
        assert!(dataset.get_data(0, "dG").is_err());
    }

    #[test]
    fn open_both_layouts() {
        for layout in [ChunkLayout::PerRow, ChunkLayout::Whole] {
            let dataset = open(layout);
            assert_eq!(dataset.name(), "Test");
            assert_eq!(dataset.source(), "Imagination");
            assert_eq!(dataset.size(), ROWS);
            assert_eq!(dataset.column_names(), ["A", "B", "C"]);
            assert_eq!(dataset.modality("A").unwrap(), Modality::Molecule3D);
            assert_eq!(dataset.modality("B").unwrap(), Modality::Image);
            assert_eq!(dataset.modality("C").unwrap(), Modality::Scalar);

            assert_eq!(dataset.get_data(5, "A").unwrap(), Datum::Structure(fixtures::row_array(5, 0.)));
            assert_eq!(
                dataset.get_data(5, "B").unwrap(),
                Datum::Image(Image::Pixels(fixtures::row_array(5, 0.5)))
            );
            assert_eq!(dataset.get_value(7, "C").unwrap(), Value::Float(0.));
        }
    }

    #[test]
    fn chunks_are_fetched_once() {
        let whole = open(ChunkLayout::Whole);
        for row in 0..10 {
            whole.get_data(row, "A").unwrap();
        }
        let stats = whole.cache_stats();
        assert_eq!((stats.fetches, stats.hits, stats.entries), (1, 9, 1));

        let per_row = open(ChunkLayout::PerRow);
        for _ in 0..3 {
            per_row.get_data(4, "A").unwrap();
            per_row.get_data(5, "A").unwrap();
        }
        let stats = per_row.cache_stats();
        assert_eq!((stats.fetches, stats.hits), (2, 4));

        per_row.clear_cache();
        assert_eq!(per_row.cache_stats().entries, 0);
    }

    #[test]
    fn missing_attributes() {
        for key in ["name", "description", "source", "annotations"] {
            let mut store = fixtures::archive(ChunkLayout::Whole);
            let mut attributes = store.attributes().unwrap();
            attributes.remove(key);
            store.write_attributes(&attributes).unwrap();

            let err = Dataset::open_store(Arc::new(store), registry()).unwrap_err();
            assert!(matches!(err, Error::Storage(StorageError::ArchiveFormat { .. })), "{key}: {err}");
        }
    }

    #[test]
    fn absent_groups() {
        let mut store = fixtures::archive(ChunkLayout::Whole);
        let mut attributes = store.attributes().unwrap();
        attributes.insert("annotations".into(), json!({"A": "MOLECULE_3D", "D": "IMAGE"}));
        store.write_attributes(&attributes).unwrap();
        let err = Dataset::open_store(Arc::new(store), registry()).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Schema { .. })), "{err}");

        // Metadata promises rows whose arrays are not there.
        let mut store = MemoryStore::new();
        store
            .write_group_metadata("A", &GroupMetadata::per_row(vec![vec![2]; 2]))
            .unwrap();
        store.write_array("A", "0", &fixtures::row_array(0, 0.)).unwrap();
        let mut attributes = fixtures::archive(ChunkLayout::Whole).attributes().unwrap();
        attributes.remove("C");
        attributes.insert("annotations".into(), json!({"A": "MOLECULE_3D"}));
        store.write_attributes(&attributes).unwrap();

        let dataset = Dataset::open_store(Arc::new(store), registry()).unwrap();
        assert!(dataset.get_data(0, "A").is_ok());
        let err = dataset.get_data(1, "A").unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Schema { .. })), "{err}");
        assert_eq!(dataset.cache_stats().fetches, 1);
    }

    #[test]
    fn unknown_tag() {
        let mut store = fixtures::archive(ChunkLayout::Whole);
        let mut attributes = store.attributes().unwrap();
        attributes.insert("annotations".into(), json!({"A": "PROTEIN"}));
        store.write_attributes(&attributes).unwrap();
        let err = Dataset::open_store(Arc::new(store), registry()).unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::UnknownModality("PROTEIN".into())));
    }

    fn assert_same(a: &Dataset, b: &Dataset) {
        assert_eq!(a.info(), b.info());
        assert_eq!(a.annotations(), b.annotations());
        assert_eq!(a.size(), b.size());
        assert_eq!(a.column_names(), b.column_names());
        assert_eq!(a.checksum(), b.checksum());
        for column in a.column_names() {
            for row in 0..a.size() {
                assert_eq!(a.get_data(row, column).unwrap(), b.get_data(row, column).unwrap(), "{column}[{row}]");
            }
        }
    }

    #[test]
    fn round_trip_chunked() {
        let dir = tempfile::tempdir().unwrap();
        for layout in [ChunkLayout::PerRow, ChunkLayout::Whole] {
            let original = open(layout);
            let path = dir.path().join(format!("{layout:?}"));
            original.write(&path).unwrap();

            let reopened = Dataset::open(&path, registry()).unwrap();
            assert_same(&original, &reopened);
        }
    }

    #[test]
    fn round_trip_memory() {
        let fingerprints = (0..ROWS).map(|i| Value::Array(fixtures::row_array(i, 0.25))).collect();
        let original = fixtures::freesolv()
            .with_column("fingerprint", fingerprints, Some(Modality::Molecule3D))
            .unwrap();

        let mut store = MemoryStore::new();
        original.to_store(&mut store).unwrap();
        assert_eq!(store.groups().unwrap(), ["fingerprint"]);
        assert_eq!(store.group_metadata("fingerprint").unwrap().layout, ChunkLayout::Whole);

        let reopened = Dataset::open_store(Arc::new(store), registry()).unwrap();
        assert_same(&original, &reopened);
    }

    #[test]
    fn ragged_arrays_are_written_per_row() {
        let ragged = (0..ROWS).map(|i| Value::Array(ndarray::ArrayD::zeros(vec![1 + i % 3]))).collect();
        let original = fixtures::freesolv().with_column("conformer", ragged, None).unwrap();
        assert_eq!(original.modality("conformer").unwrap(), Modality::Array);

        let dir = tempfile::tempdir().unwrap();
        original.write(dir.path().join("ragged")).unwrap();
        let reopened = Dataset::open(dir.path().join("ragged"), registry()).unwrap();
        assert_same(&original, &reopened);
    }

    #[test]
    fn columns_named_like_attributes_round_trip() {
        let table = Table::new()
            .with_column("source", ["vendor_a", "vendor_b"])
            .and_then(|t| t.with_column("name", [1.5, 2.5]))
            .and_then(|t| t.with_column("columns", [true, false]))
            .and_then(|t| t.with_column("annotations", [3_i64, 4]))
            .and_then(|t| t.with_column("table", ["x", "y"]))
            .unwrap();
        let original = Dataset::builder("vendors")
            .source("internal")
            .table(table)
            .build(registry())
            .unwrap();

        let mut store = MemoryStore::new();
        original.to_store(&mut store).unwrap();
        let reopened = Dataset::open_store(Arc::new(store), registry()).unwrap();
        assert_same(&original, &reopened);
        assert_eq!(reopened.source(), "internal");
        assert_eq!(reopened.get_value(1, "source").unwrap(), Value::Text("vendor_b".into()));

        let dir = tempfile::tempdir().unwrap();
        original.write(dir.path().join("vendors")).unwrap();
        assert_same(&original, &Dataset::open(dir.path().join("vendors"), registry()).unwrap());
    }

    #[test]
    fn array_columns_need_plain_group_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in [".fp", "..", "../fp", "nested/fp", "back\\slash"] {
            let arrays = (0..ROWS).map(|i| Value::Array(fixtures::row_array(i, 0.))).collect();
            let dataset = fixtures::freesolv().with_column(name, arrays, None).unwrap();

            let path = dir.path().join("out");
            let err = dataset.write(&path).unwrap_err();
            assert!(matches!(err, Error::Storage(StorageError::EntryName { .. })), "{name}: {err}");
            assert!(!path.exists(), "{name}");

            let mut store = MemoryStore::new();
            let err = dataset.to_store(&mut store).unwrap_err();
            assert!(matches!(err, Error::Storage(StorageError::EntryName { .. })), "{name}: {err}");
            assert!(store.groups().unwrap().is_empty());
            assert!(store.attributes().unwrap().is_empty());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn non_finite_scalars_round_trip() {
        let special = [f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
        let values = (0..ROWS).map(|i| Value::Float(special.get(i).copied().unwrap_or(i as f64))).collect();
        let original = fixtures::freesolv().with_column("dG", values, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        original.write(dir.path().join("dG")).unwrap();
        let reopened = Dataset::open(dir.path().join("dG"), registry()).unwrap();

        assert_eq!(reopened.column_kind("dG").unwrap(), StorageKind::Float);
        assert_eq!(reopened.get_value(0, "dG").unwrap(), Value::Float(f64::INFINITY));
        assert_eq!(reopened.get_value(1, "dG").unwrap(), Value::Float(f64::NEG_INFINITY));
        assert!(reopened.get_value(2, "dG").unwrap().as_f64().unwrap().is_nan());
        for row in 3..ROWS {
            assert_eq!(reopened.get_value(row, "dG").unwrap(), original.get_value(row, "dG").unwrap());
        }
    }

    #[test]
    fn derived_datasets_have_their_own_identity() {
        let original = fixtures::freesolv();
        assert_eq!(original.checksum(), fixtures::freesolv().checksum());

        let flags = (0..ROWS).map(|i| Value::Bool(i % 2 == 0)).collect();
        let derived = original.with_column("even", flags, None).unwrap();
        assert_ne!(derived.checksum(), original.checksum());
        assert_eq!(derived.column_names().len(), 4);
        assert!(!original.has_column("even"));

        let err = original.with_column("expt", vec![Value::Null; ROWS], None).unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::DuplicateColumn("expt".into())));

        let err = original.with_column("short", vec![Value::Null; 3], None).unwrap_err();
        assert!(matches!(err.as_validation(), Some(ValidationError::ColumnLength { .. })));
    }

    #[test]
    fn checksum_tracks_metadata() {
        let a = Dataset::new(fixtures::freesolv_table(), DatasetInfo::new("a", "", ""), BTreeMap::new(), registry()).unwrap();
        let b = Dataset::new(fixtures::freesolv_table(), DatasetInfo::new("b", "", ""), BTreeMap::new(), registry()).unwrap();
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
    }
}
