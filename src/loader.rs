//! Dataset loading and validation
//!
//! Parses a delimited pack log (one header row, one row per time sample) into
//! a [`Dataset`]. Column 0 is an index/label column and is ignored. The module
//! channels are a fixed contiguous block of columns; the pack current column is
//! resolved by header through the configured [`ChannelSchema`].
//!
//! Quoted fields with `""` escapes are supported. Quoted fields spanning
//! several lines are not.
//!
//! With the `xlsx` feature, the first worksheet of an Excel workbook is read
//! into the same [`Table`] and validated by the same rules.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::config::{ChannelSchema, LoaderConfig};
use crate::error::DiagnosticError;
use crate::types::{CurrentChannel, Dataset, ModuleChannel};

/// A parsed delimited table
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

/// One data row with its 1-based source line
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl Table {
    /// Parse delimited text. Blank lines are skipped; the first non-blank line
    /// is the header.
    pub fn parse(text: &str, delimiter: char) -> Result<Self, DiagnosticError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| DiagnosticError::DataFormat("input has no header row".to_string()))?;
        let header_line = header_line.trim_start_matches('\u{feff}');
        let headers: Vec<String> = split_record(header_line, delimiter)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, raw) in lines {
            let cells = split_record(raw, delimiter);
            if cells.len() != headers.len() {
                return Err(DiagnosticError::DataFormat(format!(
                    "line {line}: expected {} fields, found {}",
                    headers.len(),
                    cells.len()
                )));
            }
            rows.push(TableRow { line, cells });
        }

        Ok(Self { headers, rows })
    }
}

/// Split one record on `delimiter`, honouring double quotes.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == delimiter && !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Loader that turns pack logs into datasets
pub struct DatasetLoader;

impl DatasetLoader {
    /// Load a dataset from delimited text
    pub fn load_str(text: &str, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        let table = Table::parse(text, config.delimiter)?;
        Self::from_table(&table, config)
    }

    /// Load a dataset from any byte stream of delimited text
    pub fn load_reader<R: Read>(
        mut reader: R,
        config: &LoaderConfig,
    ) -> Result<Dataset, DiagnosticError> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Self::load_str(&decode_text(buffer)?, config)
    }

    /// Load a dataset from a delimited text file
    pub fn load_path(path: &Path, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        let text = decode_text(fs::read(path)?)?;
        let dataset = Self::load_str(&text, config)?;
        tracing::info!(
            file = %path.display(),
            samples = dataset.sample_count(),
            modules = dataset.module_count(),
            "Pack log loaded"
        );
        Ok(dataset)
    }

    /// Load a dataset from a file, picking the reader by extension.
    ///
    /// `.xlsx` and `.xlsm` files are read as workbooks; anything else is
    /// treated as delimited text.
    pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        if is_workbook(path) {
            Self::load_workbook(path, config)
        } else {
            Self::load_path(path, config)
        }
    }

    #[cfg(feature = "xlsx")]
    fn load_workbook(path: &Path, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        Self::load_xlsx(path, config)
    }

    #[cfg(not(feature = "xlsx"))]
    fn load_workbook(path: &Path, _config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        Err(DiagnosticError::DataFormat(format!(
            "{}: workbook input needs the `xlsx` feature; export the sheet as CSV instead",
            path.display()
        )))
    }

    /// Load a dataset from the first worksheet of an Excel workbook
    #[cfg(feature = "xlsx")]
    pub fn load_xlsx(path: &Path, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        let file = std::io::BufReader::new(fs::File::open(path)?);
        let dataset = Self::load_xlsx_reader(file, config)?;
        tracing::info!(
            file = %path.display(),
            samples = dataset.sample_count(),
            modules = dataset.module_count(),
            "Pack workbook loaded"
        );
        Ok(dataset)
    }

    /// Load a dataset from an in-memory or seekable workbook
    #[cfg(feature = "xlsx")]
    pub fn load_xlsx_reader<RS: Read + std::io::Seek>(
        reader: RS,
        config: &LoaderConfig,
    ) -> Result<Dataset, DiagnosticError> {
        let table = workbook::first_sheet(reader)?;
        Self::from_table(&table, config)
    }

    /// Build a dataset from an already-parsed table
    pub fn from_table(table: &Table, config: &LoaderConfig) -> Result<Dataset, DiagnosticError> {
        if config.module_count == 0 {
            return Err(DiagnosticError::DegenerateInput(
                "configured module_count is 0".to_string(),
            ));
        }

        let module_end = config
            .module_offset
            .checked_add(config.module_count)
            .ok_or_else(|| {
                DiagnosticError::Config(format!(
                    "loader.module_offset ({}) + loader.module_count ({}) overflows",
                    config.module_offset, config.module_count
                ))
            })?;
        if table.headers.len() < module_end {
            return Err(DiagnosticError::DataFormat(format!(
                "expected {} module columns starting at column {}, table has only {} columns",
                config.module_count,
                config.module_offset,
                table.headers.len()
            )));
        }

        if table.rows.len() < 2 {
            return Err(DiagnosticError::DegenerateInput(format!(
                "log has {} data row(s), at least 2 are required",
                table.rows.len()
            )));
        }

        let module_range = config.module_offset..module_end;
        let current_column = resolve_channel(&table.headers, &config.current, &module_range)?;
        tracing::debug!(
            column = current_column,
            header = %table.headers[current_column],
            "Resolved current channel"
        );

        let modules = module_range
            .map(|column| -> Result<ModuleChannel, DiagnosticError> {
                Ok(ModuleChannel {
                    name: table.headers[column].clone(),
                    column,
                    values: numeric_column(table, column)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let current = CurrentChannel {
            name: table.headers[current_column].clone(),
            column: current_column,
            values: numeric_column(table, current_column)?,
        };

        Dataset::new(modules, current)
    }
}

/// Find the single column named by `schema`, outside the module block.
pub fn resolve_channel(
    headers: &[String],
    schema: &ChannelSchema,
    module_range: &std::ops::Range<usize>,
) -> Result<usize, DiagnosticError> {
    let matches: Vec<usize> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, h)| schema.matches(h))
        .map(|(i, _)| i)
        .collect();

    let describe = |cols: &[usize]| {
        cols.iter()
            .map(|&c| format!("'{}' (column {c})", headers[c]))
            .collect::<Vec<_>>()
            .join(", ")
    };

    match matches.as_slice() {
        [] => Err(DiagnosticError::DataFormat(format!(
            "no column header matches current channel aliases {:?}",
            schema.aliases
        ))),
        [column] if module_range.contains(column) => Err(DiagnosticError::DataFormat(format!(
            "current channel {} lies inside the module columns {}..{}",
            describe(&matches),
            module_range.start,
            module_range.end
        ))),
        [column] => Ok(*column),
        _ => Err(DiagnosticError::DataFormat(format!(
            "current channel aliases {:?} are ambiguous: {}",
            schema.aliases,
            describe(&matches)
        ))),
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm"))
}

fn decode_text(bytes: Vec<u8>) -> Result<String, DiagnosticError> {
    String::from_utf8(bytes).map_err(|e| {
        DiagnosticError::DataFormat(format!(
            "input is not valid UTF-8 (first invalid byte at offset {}); re-export the log as UTF-8",
            e.utf8_error().valid_up_to()
        ))
    })
}

#[cfg(feature = "xlsx")]
mod workbook {
    use std::io::{Read, Seek};

    use calamine::{Data, Reader, Xlsx};

    use super::{Table, TableRow};
    use crate::error::DiagnosticError;

    /// Read the first worksheet into a table. Row numbers are 1-based sheet rows.
    pub(super) fn first_sheet<RS: Read + Seek>(reader: RS) -> Result<Table, DiagnosticError> {
        let mut workbook: Xlsx<RS> = Xlsx::new(reader)
            .map_err(|e| DiagnosticError::DataFormat(format!("cannot open workbook: {e}")))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| DiagnosticError::DataFormat("workbook has no worksheets".to_string()))?
            .map_err(|e| DiagnosticError::DataFormat(format!("cannot read worksheet: {e}")))?;

        // Cells left of the used range still count as columns
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let mut rows = range
            .rows()
            .enumerate()
            .map(|(i, cells)| {
                let mut texts = vec![String::new(); first_col as usize];
                texts.extend(cells.iter().map(cell_text));
                (first_row as usize + i + 1, texts)
            })
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()));

        let (_, headers) = rows.next().ok_or_else(|| {
            DiagnosticError::DataFormat("worksheet has no header row".to_string())
        })?;
        let headers = headers.into_iter().map(|h| h.trim().to_string()).collect();
        let rows = rows.map(|(line, cells)| TableRow { line, cells }).collect();

        Ok(Table { headers, rows })
    }

    fn cell_text(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            other => other.to_string(),
        }
    }
}

fn numeric_column(table: &Table, column: usize) -> Result<Vec<f64>, DiagnosticError> {
    let header = &table.headers[column];
    table
        .rows
        .iter()
        .map(|row| {
            let cell = row.cells[column].trim();
            if cell.is_empty() {
                return Err(DiagnosticError::DataFormat(format!(
                    "line {}: empty cell in column '{header}' (column {column})",
                    row.line
                )));
            }
            match cell.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(DiagnosticError::DataFormat(format!(
                    "line {}: non-numeric value '{cell}' in column '{header}' (column {column})",
                    row.line
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderMatch;
    use pretty_assertions::assert_eq;

    fn small_config() -> LoaderConfig {
        LoaderConfig {
            module_count: 3,
            ..Default::default()
        }
    }

    const SMALL_LOG: &str = "\
Tiempo,M1,M2,M3,Corriente (A)
0,3.70,3.71,3.69,10.0
1,3.68,3.70,3.66,20.0
2,3.69,3.70,3.67,15.0
";

    #[test]
    fn test_load_small_log() {
        let dataset = DatasetLoader::load_str(SMALL_LOG, &small_config()).unwrap();

        assert_eq!(dataset.sample_count(), 3);
        assert_eq!(dataset.module_count(), 3);
        assert_eq!(dataset.sample_index(), 0..3);
        assert_eq!(dataset.current().name, "Corriente (A)");
        assert_eq!(dataset.current().column, 4);
        assert_eq!(dataset.current().values, vec![10.0, 20.0, 15.0]);

        let names: Vec<&str> = dataset.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["M1", "M2", "M3"]);
        assert_eq!(dataset.modules()[2].values, vec![3.69, 3.66, 3.67]);
    }

    #[test]
    fn test_quoted_fields_and_bom() {
        let text = "\u{feff}idx,\"Mod, 1\",M2,\"Pack \"\"Current\"\"\"\n0,3.7,3.7,1\n1,3.7,3.6,2\n";
        let config = LoaderConfig {
            module_count: 2,
            ..Default::default()
        };
        let dataset = DatasetLoader::load_str(text, &config).unwrap();
        assert_eq!(dataset.modules()[0].name, "Mod, 1");
        assert_eq!(dataset.current().name, "Pack \"Current\"");
    }

    #[test]
    fn test_semicolon_delimiter_and_blank_lines() {
        let text = "t;A;B;Corriente\n\n0;3.7;3.7;0\n\n1;3.7;3.7;5\n";
        let config = LoaderConfig {
            module_count: 2,
            delimiter: ';',
            ..Default::default()
        };
        let dataset = DatasetLoader::load_str(text, &config).unwrap();
        assert_eq!(dataset.sample_count(), 2);
    }

    #[test]
    fn test_too_few_module_columns() {
        let err = DatasetLoader::load_str(SMALL_LOG, &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
        assert!(err.to_string().contains("expected 20 module columns"));
    }

    #[test]
    fn test_non_numeric_cell_names_column_and_line() {
        let text = "t,M1,M2,M3,Current\n0,3.7,3.7,3.7,1\n1,3.7,abc,3.7,2\n";
        let err = DatasetLoader::load_str(text, &small_config()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("'M2'"));
    }

    #[test]
    fn test_nan_and_empty_cells_rejected() {
        let nan = "t,M1,M2,M3,Current\n0,3.7,NaN,3.7,1\n1,3.7,3.7,3.7,2\n";
        assert!(matches!(
            DatasetLoader::load_str(nan, &small_config()),
            Err(DiagnosticError::DataFormat(_))
        ));

        let empty = "t,M1,M2,M3,Current\n0,3.7,3.7,3.7,\n1,3.7,3.7,3.7,2\n";
        assert!(matches!(
            DatasetLoader::load_str(empty, &small_config()),
            Err(DiagnosticError::DataFormat(_))
        ));
    }

    #[test]
    fn test_missing_current_column() {
        let text = "t,M1,M2,M3,Temp\n0,3.7,3.7,3.7,25\n1,3.7,3.7,3.7,25\n";
        let err = DatasetLoader::load_str(text, &small_config()).unwrap_err();
        assert!(err.to_string().contains("no column header matches"));
    }

    #[test]
    fn test_ambiguous_current_column() {
        let text = "t,M1,M2,M3,Current,Current limit\n0,3.7,3.7,3.7,1,50\n1,3.7,3.7,3.7,2,50\n";
        let err = DatasetLoader::load_str(text, &small_config()).unwrap_err();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_exact_match_disambiguates() {
        let text = "t,M1,M2,M3,Current,Current limit\n0,3.7,3.7,3.7,1,50\n1,3.7,3.7,3.7,2,50\n";
        let mut config = small_config();
        config.current = ChannelSchema {
            aliases: vec!["current".to_string()],
            match_mode: HeaderMatch::Exact,
        };
        let dataset = DatasetLoader::load_str(text, &config).unwrap();
        assert_eq!(dataset.current().column, 4);
    }

    #[test]
    fn test_current_inside_module_block_rejected() {
        let text = "t,M1,Current,M3,Temp\n0,3.7,1,3.7,25\n1,3.7,2,3.7,25\n";
        let err = DatasetLoader::load_str(text, &small_config()).unwrap_err();
        assert!(err.to_string().contains("inside the module columns"));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let text = "t,M1,M2,M3,Current\n0,3.7,3.7,3.7,1\n1,3.7,3.7,2\n";
        let err = DatasetLoader::load_str(text, &small_config()).unwrap_err();
        assert!(err.to_string().contains("line 3: expected 5 fields, found 4"));
    }

    #[test]
    fn test_single_row_is_degenerate() {
        let text = "t,M1,M2,M3,Current\n0,3.7,3.7,3.7,1\n";
        assert!(matches!(
            DatasetLoader::load_str(text, &small_config()),
            Err(DiagnosticError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_zero_modules_is_degenerate() {
        let config = LoaderConfig {
            module_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            DatasetLoader::load_str(SMALL_LOG, &config),
            Err(DiagnosticError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            DatasetLoader::load_str("\n\n", &small_config()),
            Err(DiagnosticError::DataFormat(_))
        ));
    }

    #[test]
    fn test_load_reader_and_path() {
        let from_reader =
            DatasetLoader::load_reader(SMALL_LOG.as_bytes(), &small_config()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.csv");
        std::fs::write(&path, SMALL_LOG).unwrap();
        let from_path = DatasetLoader::load_path(&path, &small_config()).unwrap();

        assert_eq!(from_reader, from_path);
    }

    #[test]
    fn test_latin1_log_is_data_format_error() {
        let latin1: &[u8] = b"t,M\xf3dulo1,M2,M3,Corriente\n0,3.7,3.7,3.7,1\n1,3.7,3.7,3.7,2\n";

        let err = DatasetLoader::load_reader(latin1, &small_config()).unwrap_err();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
        assert!(err.to_string().contains("offset 3"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.csv");
        std::fs::write(&path, latin1).unwrap();
        let err = DatasetLoader::load_path(&path, &small_config()).unwrap_err();
        assert_eq!(err.code(), "DATA_FORMAT_ERROR");
    }

    #[test]
    fn test_missing_file_stays_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            DatasetLoader::load_path(&dir.path().join("absent.csv"), &small_config()).unwrap_err();
        assert!(matches!(err, DiagnosticError::Io(_)));
    }

    #[test]
    fn test_module_range_overflow_is_config_error() {
        let config = LoaderConfig {
            module_count: usize::MAX,
            ..Default::default()
        };
        let err = DatasetLoader::load_str(SMALL_LOG, &config).unwrap_err();
        assert!(matches!(err, DiagnosticError::Config(_)));
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_load_file_reads_text_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.txt");
        std::fs::write(&path, SMALL_LOG).unwrap();
        let dataset = DatasetLoader::load_file(&path, &small_config()).unwrap();
        assert_eq!(dataset.sample_count(), 3);
    }

    #[cfg(feature = "xlsx")]
    fn write_small_workbook(path: &Path) {
        use rust_xlsxwriter::Workbook;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let headers = ["Tiempo", "M1", "M2", "M3", "Corriente (A)"];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        let rows = [
            [0.0, 3.70, 3.71, 3.69, 10.0],
            [1.0, 3.68, 3.70, 3.66, 20.0],
            [2.0, 3.69, 3.70, 3.67, 15.0],
        ];
        for (r, row) in rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                sheet.write_number(r as u32 + 1, col as u16, *value).unwrap();
            }
        }
        workbook.save(path).unwrap();
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_load_xlsx_matches_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.xlsx");
        write_small_workbook(&path);

        let from_xlsx = DatasetLoader::load_xlsx(&path, &small_config()).unwrap();
        let from_csv = DatasetLoader::load_str(SMALL_LOG, &small_config()).unwrap();
        assert_eq!(from_xlsx, from_csv);

        let by_extension = DatasetLoader::load_file(&path, &small_config()).unwrap();
        assert_eq!(by_extension, from_csv);
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_xlsx_text_cell_names_sheet_row() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["t", "M1", "M2", "M3", "Current"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for col in 0..5u16 {
            sheet.write_number(1, col, 1.0).unwrap();
            sheet.write_number(2, col, 2.0).unwrap();
        }
        sheet.write_string(2, 2, "n/a").unwrap();
        workbook.save(&path).unwrap();

        let err = DatasetLoader::load_xlsx(&path, &small_config()).unwrap_err();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("'M2'"));
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_garbage_workbook_rejected() {
        let bytes = std::io::Cursor::new(b"not a workbook".to_vec());
        let err = DatasetLoader::load_xlsx_reader(bytes, &small_config()).unwrap_err();
        assert!(matches!(err, DiagnosticError::DataFormat(_)));
    }
}
