//! Shared test data: a small FreeSolv-like table and archives laid out like
//! the ones the dataset layer reads.

use std::sync::Arc;

use ndarray::{Array2, ArrayD};
use serde_json::{json, Value as JsonValue};

use crate::constants::WHOLE_ARRAY_NAME;
use crate::data::{ChunkLayout, Dataset, GroupMetadata, MemoryStore, Modality, ModalityRegistry, Table, WritableStore};

pub const ROWS: usize = 100;
pub const WIDTH: usize = 8;

const SMILES: [&str; 5] = ["CCO", "c1ccccc1", "CN(C)C(=O)c1ccc(cc1)OC", "ClC(Cl)(Cl)Br", "CC(=O)O"];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn expt(row: usize) -> f64 {
    (row as f64 - 50.) / 4.
}

pub fn calc(row: usize) -> f64 {
    expt(row) + 0.5
}

/// `smiles`, `expt` and `calc` over [`ROWS`] rows.
pub fn freesolv_table() -> Table {
    Table::new()
        .with_column("smiles", (0..ROWS).map(|i| SMILES[i % SMILES.len()]))
        .and_then(|t| t.with_column("expt", (0..ROWS).map(expt)))
        .and_then(|t| t.with_column("calc", (0..ROWS).map(calc)))
        .unwrap()
}

pub fn freesolv() -> Arc<Dataset> {
    init_logging();
    let dataset = Dataset::builder("freesolv")
        .description("Hydration free energies of small molecules")
        .source("https://github.com/MobleyLab/FreeSolv")
        .table(freesolv_table())
        .annotate("smiles", Modality::Molecule)
        .build(Arc::new(ModalityRegistry::default()))
        .unwrap();
    Arc::new(dataset)
}

/// Row `i` of a chunked column: `WIDTH` copies of `i + offset`.
pub fn row_array(i: usize, offset: f64) -> ArrayD<f64> {
    ArrayD::from_elem(vec![WIDTH], i as f64 + offset)
}

/// An archive with a `MOLECULE_3D` group `A`, an `IMAGE` group `B`, both
/// stored with `layout`, and a scalar column `C` kept at the root, as older archives do.
pub fn archive(layout: ChunkLayout) -> MemoryStore {
    let mut store = MemoryStore::new();
    for (group, offset) in [("A", 0.), ("B", 0.5)] {
        match layout {
            ChunkLayout::PerRow => {
                store
                    .write_group_metadata(group, &GroupMetadata::per_row(vec![vec![WIDTH]; ROWS]))
                    .unwrap();
                for i in 0..ROWS {
                    store.write_array(group, &i.to_string(), &row_array(i, offset)).unwrap();
                }
            }
            ChunkLayout::Whole => {
                let data = Array2::from_shape_fn((ROWS, WIDTH), |(i, _)| i as f64 + offset).into_dyn();
                store.write_group_metadata(group, &GroupMetadata::whole(vec![ROWS, WIDTH])).unwrap();
                store.write_array(group, WHOLE_ARRAY_NAME, &data).unwrap();
            }
        }
    }

    let c = (0..ROWS).map(|i| (i.to_string(), json!(0.0))).collect();
    let attributes = match json!({
        "name": "Test",
        "description": "Go wild in your test cases",
        "source": "Imagination",
        "annotations": {"A": "MOLECULE_3D", "B": "IMAGE"},
    }) {
        JsonValue::Object(mut map) => {
            map.insert("C".into(), JsonValue::Object(c));
            map
        }
        _ => unreachable!(),
    };
    store.write_attributes(&attributes).unwrap();
    store
}
