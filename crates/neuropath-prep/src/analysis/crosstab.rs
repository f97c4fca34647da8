use serde::Serialize;
use std::fmt;

/// A labelled count table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossTab {
    pub title: String,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl CrossTab {
    pub fn new(title: &str, rows: &[&str], cols: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            row_labels: rows.iter().map(|s| s.to_string()).collect(),
            col_labels: cols.iter().map(|s| s.to_string()).collect(),
            counts: vec![vec![0; cols.len()]; rows.len()],
        }
    }

    /// Add one to a cell. Out-of-range positions are ignored.
    pub fn increment(&mut self, row: usize, col: usize) {
        if let Some(cell) = self.counts.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell += 1;
        }
    }

    pub fn count(&self, row: usize, col: usize) -> usize {
        self.counts
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .unwrap_or(0)
    }

    pub fn row_total(&self, row: usize) -> usize {
        self.counts.get(row).map(|r| r.iter().sum()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

impl fmt::Display for CrossTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label_width = self
            .row_labels
            .iter()
            .map(String::len)
            .chain(std::iter::once(5))
            .max()
            .unwrap_or(5);
        let cell_width = self
            .col_labels
            .iter()
            .map(String::len)
            .chain(self.counts.iter().flatten().map(|c| c.to_string().len()))
            .chain(std::iter::once(5))
            .max()
            .unwrap_or(5);

        writeln!(f, "{}", self.title)?;
        write!(f, "{:<label_width$}", "")?;
        for col in &self.col_labels {
            write!(f, "  {:>cell_width$}", col)?;
        }
        writeln!(f, "  {:>cell_width$}", "Total")?;

        for (i, label) in self.row_labels.iter().enumerate() {
            write!(f, "{:<label_width$}", label)?;
            for count in &self.counts[i] {
                write!(f, "  {:>cell_width$}", count)?;
            }
            writeln!(f, "  {:>cell_width$}", self.row_total(i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counts_and_totals() {
        let mut tab = CrossTab::new("t", &["a", "b"], &["x", "y", "z"]);
        tab.increment(0, 2);
        tab.increment(0, 2);
        tab.increment(1, 0);
        tab.increment(5, 0);

        assert_eq!(tab.count(0, 2), 2);
        assert_eq!(tab.row_total(0), 2);
        assert_eq!(tab.total(), 3);
        assert_eq!(tab.count(9, 9), 0);
    }

    #[test]
    fn test_display_layout() {
        let mut tab = CrossTab::new("ABC by class", &["Tau", "Vasc"], &["0", "1"]);
        tab.increment(1, 1);
        let text = tab.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "ABC by class");
        assert!(lines[1].ends_with("Total"));
        assert!(lines[3].starts_with("Vasc"));
        assert!(lines[3].trim_end().ends_with('1'));
        assert_eq!(lines.len(), 4);
    }
}
