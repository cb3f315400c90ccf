//! # **Print Module** - *Pretty Printing with Attitude*
//!
//! Contains the grid renderer behind the `Display` implementations of
//! `RecordBatch` and `Table`, and a `Print` trait which wraps `Display` to
//! provide `myobj.print()` for any object that implements it.
use std::fmt::{self, Display, Formatter};

use crate::enums::scalar::Scalar;

pub(crate) const MAX_PREVIEW: usize = 50;

/// # Print
///
/// Loaded print trait for pretty printing tables
///
/// Provides a more convenient way to activate `Display`
/// for other types such as batches via `mybatch.print()`,
/// avoiding the need to write `println!("{}", mybatch);`
pub trait Print {
    #[inline]
    fn print(&self)
    where
        Self: Display,
    {
        println!("{}", self);
    }
}

impl<T: Display> Print for T where T: Display {}

/// Cell text for one value.
pub(crate) fn scalar_to_string(value: &Scalar) -> String {
    match value {
        Scalar::Float(v) => format_float(*v),
        Scalar::Utf8(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a boxed grid with an index column.
///
/// Shows every row up to [`MAX_PREVIEW`], otherwise the first and last ten.
pub(crate) fn write_grid(
    f: &mut Formatter<'_>,
    title: &str,
    headers: Vec<String>,
    n_rows: usize,
    cell: impl Fn(usize, usize) -> String,
) -> fmt::Result {
    writeln!(f, "{title} [{n_rows} rows × {} cols]", headers.len())?;
    if headers.is_empty() {
        return Ok(());
    }
    let row_indices: Vec<usize> = if n_rows <= MAX_PREVIEW {
        (0..n_rows).collect()
    } else {
        let mut idx = (0..10).collect::<Vec<_>>();
        idx.extend((n_rows - 10)..n_rows);
        idx
    };

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(row_indices.len());
    for &row in &row_indices {
        let cells: Vec<String> = (0..headers.len()).map(|col| cell(row, col)).collect();
        for (w, c) in widths.iter_mut().zip(&cells) {
            *w = (*w).max(c.chars().count());
        }
        rows.push(cells);
    }
    let idx_width = usize::max(3, n_rows.max(1).to_string().len());

    print_rule(f, idx_width, &widths)?;
    print_header_row(f, idx_width, &headers, &widths)?;
    print_rule(f, idx_width, &widths)?;
    for (i, cells) in rows.iter().enumerate() {
        let physical_row = row_indices[i];
        write!(f, "| {idx:>w$} |", idx = physical_row, w = idx_width)?;
        for (c, &w) in cells.iter().zip(&widths) {
            write!(f, " {c:>w$} |")?;
        }
        writeln!(f)?;
        if n_rows > MAX_PREVIEW && i == 9 {
            print_ellipsis_row(f, idx_width, &widths)?;
        }
    }
    print_rule(f, idx_width, &widths)
}

pub(crate) fn print_rule(
    f: &mut Formatter<'_>,
    idx_width: usize,
    col_widths: &[usize],
) -> fmt::Result {
    write!(f, "+{:-<w$}+", "", w = idx_width + 2)?; // idx column (+2 for spaces)
    for &w in col_widths {
        write!(f, "{:-<w$}+", "", w = w + 2)?; // +2 for spaces
    }
    writeln!(f)
}

pub(crate) fn print_header_row(
    f: &mut Formatter<'_>,
    idx_width: usize,
    headers: &[String],
    col_widths: &[usize],
) -> fmt::Result {
    write!(f, "| {hdr:^w$} |", hdr = "idx", w = idx_width)?;
    for (hdr, &w) in headers.iter().zip(col_widths) {
        write!(f, " {hdr:^w$} |", hdr = hdr, w = w)?;
    }
    writeln!(f)
}

pub(crate) fn print_ellipsis_row(
    f: &mut Formatter<'_>,
    idx_width: usize,
    col_widths: &[usize],
) -> fmt::Result {
    write!(f, "| {dots:^w$} |", dots = "…", w = idx_width)?;
    for &w in col_widths {
        write!(f, " {dots:^w$} |", dots = "…", w = w)?;
    }
    writeln!(f)
}

/// Formats floating point numbers:
/// - Keeps up to 6 decimal digits
/// - Trims trailing zeroes and unnecessary decimal point
#[inline]
pub(crate) fn format_float(v: f64) -> String {
    let s = format!("{:.6}", v);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
