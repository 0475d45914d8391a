/*
Copyright 2025 Open Data PVNet contributors

This file is part of PVNet Data Sampler.

PVNet Data Sampler is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

PVNet Data Sampler is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with PVNet Data Sampler. If not, see https://www.gnu.org/licenses/.
*/

//! Tabular and array forms of GSP generation data.
//!
//! Missing values are NaN in both forms.

use crate::errors::GspError;
use chrono::NaiveDateTime;
use ndarray::Array2;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// One row of a [`GspTable`], indexed by `(gsp_id, datetime_gmt)`.
#[derive(Clone, PartialEq, Debug)]
pub struct GspRow {
    pub gsp_id: u16,
    pub datetime_gmt: NaiveDateTime,

    /// Values in the order of the table columns.
    pub values: Vec<f64>,
}

/// Rows of generation data with named value columns.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct GspTable {
    columns: Vec<String>,
    rows: Vec<GspRow>,
}

impl GspTable {
    pub fn new(columns: Vec<String>) -> Self {
        GspTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        gsp_id: u16,
        datetime_gmt: NaiveDateTime,
        values: Vec<f64>,
    ) -> Result<(), GspError> {
        if values.len() != self.columns.len() {
            return Err(GspError::Table(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }

        self.rows.push(GspRow {
            gsp_id,
            datetime_gmt,
            values,
        });

        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[GspRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.values[index]).collect())
    }

    pub fn retain_rows<F: FnMut(&GspRow) -> bool>(&mut self, f: F) {
        self.rows.retain(f);
    }

    /// Labels every row with `gsp_id`.
    pub fn assign_gsp_id(&mut self, gsp_id: u16) {
        for row in &mut self.rows {
            row.gsp_id = gsp_id;
        }
    }

    /// Stacks tables one after another. Columns are the union of all
    /// columns in order of appearance; absent ones are NaN.
    pub fn concat(tables: Vec<GspTable>) -> GspTable {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut combined = GspTable::new(columns);

        for table in tables {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .filter_map(|c| combined.columns.iter().position(|name| name == c))
                .collect();

            for row in table.rows {
                let mut values = vec![f64::NAN; combined.columns.len()];
                for (&position, value) in positions.iter().zip(row.values) {
                    values[position] = value;
                }

                combined.rows.push(GspRow { values, ..row });
            }
        }

        combined
    }
}

/// Array form of a [`GspTable`]: one `(gsp_id, datetime_gmt)` array
/// per column over sorted, distinct axes.
#[derive(Clone, PartialEq, Debug)]
pub struct GspDataset {
    pub gsp_id: Vec<u16>,
    pub datetime_gmt: Vec<NaiveDateTime>,
    pub variables: Vec<(String, Array2<f64>)>,
}

impl GspDataset {
    /// Fails when two rows share the same `(gsp_id, datetime_gmt)`.
    pub fn from_table(table: &GspTable) -> Result<Self, GspError> {
        let gsp_id: Vec<u16> = table
            .rows
            .iter()
            .map(|r| r.gsp_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let datetime_gmt: Vec<NaiveDateTime> = table
            .rows
            .iter()
            .map(|r| r.datetime_gmt)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let gsp_index: FxHashMap<u16, usize> =
            gsp_id.iter().enumerate().map(|(i, &g)| (g, i)).collect();
        let time_index: FxHashMap<NaiveDateTime, usize> =
            datetime_gmt.iter().enumerate().map(|(i, &t)| (t, i)).collect();

        let shape = (gsp_id.len(), datetime_gmt.len());
        let mut filled = Array2::from_elem(shape, false);
        let mut arrays = vec![Array2::from_elem(shape, f64::NAN); table.columns.len()];

        for row in &table.rows {
            let cell = [gsp_index[&row.gsp_id], time_index[&row.datetime_gmt]];

            if filled[cell] {
                return Err(GspError::DuplicateRow(row.gsp_id, row.datetime_gmt));
            }
            filled[cell] = true;

            for (array, &value) in arrays.iter_mut().zip(&row.values) {
                array[cell] = value;
            }
        }

        Ok(GspDataset {
            gsp_id,
            datetime_gmt,
            variables: table.columns.iter().cloned().zip(arrays).collect(),
        })
    }

    /// Flattens back to rows ordered by `gsp_id`, then `datetime_gmt`.
    /// Every cell of the grid becomes a row, so a table with gaps
    /// comes back with NaN rows filling them.
    pub fn to_table(&self) -> GspTable {
        let columns = self.variables.iter().map(|(name, _)| name.clone()).collect();
        let mut table = GspTable::new(columns);

        for (g, &gsp_id) in self.gsp_id.iter().enumerate() {
            for (t, &datetime_gmt) in self.datetime_gmt.iter().enumerate() {
                let values = self.variables.iter().map(|(_, a)| a[[g, t]]).collect();

                table.rows.push(GspRow {
                    gsp_id,
                    datetime_gmt,
                    values,
                });
            }
        }

        table
    }

    pub fn variable(&self, name: &str) -> Option<&Array2<f64>> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, array)| array)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::five_rows;
    use super::{GspDataset, GspTable};
    use crate::errors::GspError;
    use chrono::Duration;

    #[test]
    fn five_rows_survive_array_form() {
        let table = five_rows();
        let dataset = GspDataset::from_table(&table).unwrap();

        assert_eq!(dataset.gsp_id, vec![0]);
        assert_eq!(dataset.datetime_gmt.len(), 5);
        assert_eq!(
            dataset.variable("generation_mw").unwrap().row(0).to_vec(),
            vec![100.0, 110.0, 120.0, 115.0, 105.0]
        );

        assert_eq!(dataset.to_table(), table);
    }

    #[test]
    fn axes_are_sorted_and_gaps_are_nan() {
        let five = five_rows();
        let mut table = GspTable::new(five.columns().to_vec());
        let rows = five.rows();
        table.push(2, rows[1].datetime_gmt, vec![1.0, 2.0]).unwrap();
        table.push(1, rows[0].datetime_gmt, vec![3.0, 4.0]).unwrap();

        let dataset = GspDataset::from_table(&table).unwrap();
        let generation = dataset.variable("generation_mw").unwrap();

        assert_eq!(dataset.gsp_id, vec![1, 2]);
        assert_eq!(dataset.datetime_gmt, vec![rows[0].datetime_gmt, rows[1].datetime_gmt]);
        assert_eq!(generation[[0, 0]], 3.0);
        assert_eq!(generation[[1, 1]], 1.0);
        assert!(generation[[0, 1]].is_nan());
        assert_eq!(dataset.to_table().len(), 4);
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let mut table = five_rows();
        let first = table.rows()[0].datetime_gmt;
        table.push(0, first, vec![1.0, 1.0]).unwrap();

        let result = GspDataset::from_table(&table);

        assert!(matches!(result, Err(GspError::DuplicateRow(0, t)) if t == first));
    }

    #[test]
    fn concat_unions_columns() {
        let first = five_rows();
        let mut second = GspTable::new(vec![
            "installedcapacity_mwp".to_string(),
            "generation_mw".to_string(),
        ]);
        let later = first.rows()[4].datetime_gmt + Duration::minutes(30);
        second.push(0, later, vec![210.0, 90.0]).unwrap();

        let combined = GspTable::concat(vec![first, second]);

        assert_eq!(
            combined.columns(),
            &["generation_mw", "capacity_mwp", "installedcapacity_mwp"]
        );
        assert_eq!(combined.len(), 6);
        assert_eq!(combined.rows()[5].values[0], 90.0);
        assert!(combined.rows()[5].values[1].is_nan());
        assert!(combined.rows()[0].values[2].is_nan());
    }

    #[test]
    fn rows_must_match_columns() {
        let mut table = five_rows();
        let t = table.rows()[0].datetime_gmt;

        assert!(matches!(table.push(3, t, vec![1.0]), Err(GspError::Table(_))));
    }
}
