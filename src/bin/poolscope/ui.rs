//! Terminal rendering for the text output format.

use std::io::IsTerminal;

use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// How a grid column is aligned and painted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Col<'a> {
    /// Left-aligned label text.
    Text(&'a str),
    /// Right-aligned number.
    Num(&'a str),
    /// Left-aligned `alloc`/`free` marker, painted by operation.
    Op(&'a str),
}

impl<'a> Col<'a> {
    fn name(self) -> &'a str {
        match self {
            Col::Text(name) | Col::Num(name) | Col::Op(name) => name,
        }
    }

    fn pad(self, cell: &str, width: usize) -> String {
        match self {
            Col::Num(_) => format!("{cell:>width$}"),
            Col::Text(_) | Col::Op(_) => format!("{cell:<width$}"),
        }
    }
}

struct Styles {
    title: Style,
    label: Style,
    alloc: Style,
    free: Style,
    note: Style,
    alert: Style,
}

impl Styles {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Plain => Self {
                title: Style::new(),
                label: Style::new(),
                alloc: Style::new(),
                free: Style::new(),
                note: Style::new(),
                alert: Style::new(),
            },
            Theme::Light => Self {
                title: Style::new().fg(Color::Blue).bold(),
                label: Style::new().fg(Color::DarkGray),
                alloc: Style::new().fg(Color::Green),
                free: Style::new().fg(Color::Red),
                note: Style::new().fg(Color::Purple),
                alert: Style::new().fg(Color::Red).bold(),
            },
            Theme::Dark | Theme::Auto => Self {
                title: Style::new().fg(Color::LightCyan).bold(),
                label: Style::new().fg(Color::LightGray),
                alloc: Style::new().fg(Color::LightGreen),
                free: Style::new().fg(Color::LightRed),
                note: Style::new().fg(Color::LightBlue),
                alert: Style::new().fg(Color::Yellow).bold(),
            },
        }
    }
}

/// Writes views to stdout, colored only when stdout is a terminal.
pub struct Ui {
    styles: Styles,
    paint: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let paint = theme != Theme::Plain && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        Self {
            styles: Styles::for_theme(theme),
            paint,
        }
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.paint {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn gap(&self) {
        println!();
    }

    /// Labelled values under a title, labels right-aligned.
    pub fn fields(&self, title: &str, rows: &[(&str, String)]) {
        println!("{}", self.paint(self.styles.title, title));
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            let label = self.paint(self.styles.label, &format!("{label:>width$}"));
            println!("  {label}  {value}");
        }
    }

    /// A titled grid; prints `(empty)` instead of a header when `rows` is empty.
    pub fn grid(&self, title: &str, columns: &[Col<'_>], rows: &[Vec<String>]) {
        println!("{}", self.paint(self.styles.title, title));
        if rows.is_empty() {
            println!("  {}", self.paint(self.styles.note, "(empty)"));
            return;
        }
        let widths = widths(columns, rows);
        let header = join(padded(columns, columns.iter().map(|col| col.name()), &widths));
        println!("  {}", self.paint(self.styles.label, &header));
        for row in rows {
            let cells = padded(columns, row.iter().map(String::as_str), &widths)
                .into_iter()
                .zip(columns)
                .map(|(cell, col)| {
                    let style = match (col, cell.trim_end()) {
                        (Col::Op(_), "alloc") => Some(self.styles.alloc),
                        (Col::Op(_), "free") => Some(self.styles.free),
                        _ => None,
                    };
                    match style {
                        Some(style) => self.paint(style, &cell),
                        None => cell,
                    }
                })
                .collect();
            println!("  {}", join(cells));
        }
    }

    /// Page footer naming the cursor that resumes the listing.
    pub fn page_footer(&self, count: u64, next: Option<u64>) {
        let text = match next {
            Some(next) => format!("{count} shown; continue with --cursor {next}"),
            None => format!("{count} shown; end of listing"),
        };
        println!("{}", self.paint(self.styles.note, &text));
    }

    pub fn status(&self, message: &str) {
        println!("{}", self.paint(self.styles.note, message));
    }

    /// Goes to stderr so JSON and piped text stay clean.
    pub fn alert(&self, message: &str) {
        eprintln!("{} {message}", self.paint(self.styles.alert, "warning:"));
    }
}

fn widths(columns: &[Col<'_>], rows: &[Vec<String>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            rows.iter()
                .filter_map(|row| row.get(idx))
                .map(String::len)
                .fold(col.name().len(), usize::max)
        })
        .collect()
}

fn padded<'c>(
    columns: &[Col<'_>],
    cells: impl Iterator<Item = &'c str>,
    widths: &[usize],
) -> Vec<String> {
    columns
        .iter()
        .zip(cells)
        .zip(widths)
        .map(|((col, cell), &width)| col.pad(cell, width))
        .collect()
}

fn join(cells: Vec<String>) -> String {
    cells.join("  ").trim_end().to_string()
}

/// Unpainted header line followed by one line per row.
#[cfg(test)]
fn layout(columns: &[Col<'_>], rows: &[Vec<String>]) -> Vec<String> {
    let widths = widths(columns, rows);
    let mut lines = vec![join(padded(columns, columns.iter().map(|col| col.name()), &widths))];
    lines.extend(
        rows.iter()
            .map(|row| join(padded(columns, row.iter().map(String::as_str), &widths))),
    );
    lines
}
