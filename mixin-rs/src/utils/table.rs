//! Summary tables for the apply, inspect and list commands

use prettytable::{Cell, Row, Table};

/// Create a table with bold headers
pub fn create_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    let header_cells: Vec<Cell> = headers
        .into_iter()
        .map(|h| Cell::new(h).style_spec("b"))
        .collect();
    table.set_titles(Row::new(header_cells));

    table
}

/// Add a left-aligned row
pub fn add_table_row(table: &mut Table, cells: Vec<String>) {
    add_aligned_row(table, cells, &[]);
}

/// Add a row, right-aligning the columns listed in `right`
///
/// Counts and sizes line up on their last digit this way.
pub fn add_aligned_row(table: &mut Table, cells: Vec<String>, right: &[usize]) {
    let row_cells: Vec<Cell> = cells
        .into_iter()
        .enumerate()
        .map(|(column, text)| {
            let cell = Cell::new(&text);
            if right.contains(&column) {
                cell.style_spec("r")
            } else {
                cell
            }
        })
        .collect();
    table.add_row(Row::new(row_cells));
}
