// wireprint/src/output/join.rs
//
// Outer merge of the three output families (TLS, JA4X, JA4TS) on the
// transport 4-tuple. Unmatched rows from any side are preserved with the
// other families' columns empty — outer-join semantics, not inner.

use std::collections::BTreeMap;

use super::emit::Row;

#[derive(Default)]
struct Slot<'a> {
    tls: Option<&'a Row>,
    ja4x: Option<&'a Row>,
    ja4ts: Option<&'a Row>,
}

pub fn outer_join(
    tls: &[Row],
    ja4x: &[Row],
    ja4ts: &[Row],
    tls_width: usize,
    ja4x_width: usize,
    ja4ts_width: usize,
) -> Vec<Row> {
    // BTreeMap keeps the merged output key-sorted and deterministic.
    let mut slots: BTreeMap<&[String; 4], Slot<'_>> = BTreeMap::new();
    for row in tls {
        slots.entry(&row.key).or_default().tls.get_or_insert(row);
    }
    for row in ja4x {
        slots.entry(&row.key).or_default().ja4x.get_or_insert(row);
    }
    for row in ja4ts {
        slots.entry(&row.key).or_default().ja4ts.get_or_insert(row);
    }

    slots
        .into_iter()
        .map(|(key, slot)| {
            let mut cols = Vec::with_capacity(tls_width + ja4x_width + ja4ts_width);
            extend_or_pad(&mut cols, slot.tls, tls_width);
            extend_or_pad(&mut cols, slot.ja4x, ja4x_width);
            extend_or_pad(&mut cols, slot.ja4ts, ja4ts_width);
            Row { key: key.clone(), cols }
        })
        .collect()
}

fn extend_or_pad(cols: &mut Vec<String>, row: Option<&Row>, width: usize) {
    match row {
        Some(row) => {
            cols.extend(row.cols.iter().cloned());
            // a malformed row never shifts the columns to its right
            cols.resize(cols.len() + width.saturating_sub(row.cols.len()), String::new());
        }
        None => cols.resize(cols.len() + width, String::new()),
    }
}
