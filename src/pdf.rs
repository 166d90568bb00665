use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat, Stream};
use tempfile::NamedTempFile;

use crate::error::FastBillError;
use crate::time_entry::TimeEntry;
use crate::timesheet::{Timesheet, HEADER};

/// A4縦のページサイズ(pt)。
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

const MARGIN_LEFT: f32 = 30.0;
const MARGIN_RIGHT: f32 = 30.0;
const MARGIN_TOP: f32 = 30.0;
const MARGIN_BOTTOM: f32 = 18.0;

const TITLE_SIZE: f32 = 18.0;
const TITLE_LEADING: f32 = 22.0;
const BODY_SIZE: f32 = 10.0;
const BODY_LEADING: f32 = 12.0;

const CELL_PADDING: f32 = 3.0;
const GRID_WIDTH: f32 = 0.25;

/// `fixed`レイアウトでの日付、開始、終了、時間の列幅。説明の列は残りの幅を使う。
const FIXED_WIDTHS: [f32; 4] = [70.0, 45.0, 45.0, 45.0];

/// データ行で右寄せにする列。開始、終了、時間。
const BODY_RIGHT_ALIGNED: [bool; 5] = [false, true, true, true, false];

/// 署名欄の下線の長さ。
const SIGNATURE_UNDERLINE: usize = 35;

/// 表の列幅の決め方。
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ArgEnum)]
pub enum ColumnLayout {
    /// 固定の列幅。
    Fixed,
    /// 内容に合わせた列幅。
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// ページに描画する要素。座標はページ左下を原点とするpt。
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        text: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

/// レイアウト済みの1ページ。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

/// タイムエントリーからタイムシートを作成し、`<output_path>.pdf`に書き出す。
///
/// 既存のファイルは上書きする。エントリーの検証とPDFの生成が全て成功してから、
/// 同じディレクトリの一時ファイルに書き込んで置き換えるため、失敗した場合は既存のファイルに触れない。
///
/// # Arguments
///
/// * `entries` - 順不同のタイムエントリー
/// * `title` - タイトルに表示する文字列
/// * `username` - タイトルに表示するユーザー名
/// * `output_path` - 拡張子を除いた出力先
/// * `columns` - 表の列幅の決め方
pub fn build_report(
    entries: &[TimeEntry],
    title: &str,
    username: &str,
    output_path: &Path,
    columns: ColumnLayout,
) -> Result<PathBuf, FastBillError> {
    let timesheet = Timesheet::build(entries, title, username)?;
    info!(
        "Total minutes: {}, real hours: {}, decimal hours: {}",
        timesheet.summary.total_minutes,
        timesheet.summary.real_hours(),
        timesheet.summary.decimal_hours_label()
    );

    let pages = layout(&timesheet, columns);
    let bytes = render(&pages)?;

    let path = pdf_path(output_path);
    write_atomically(&path, &bytes)?;
    info!(
        "Wrote {} page(s), {} bytes to {}",
        pages.len(),
        bytes.len(),
        path.display()
    );

    Ok(path)
}

/// 同じディレクトリの一時ファイルに書き込み、`path`へリネームする。
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), FastBillError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| FastBillError::Io(e.error))?;
    Ok(())
}

/// 拡張子`.pdf`を付けたパスを返す。
fn pdf_path(output_path: &Path) -> PathBuf {
    let mut path = output_path.as_os_str().to_owned();
    path.push(".pdf");
    PathBuf::from(path)
}

/// タイムシートをページに割り付ける。
///
/// タイトル、ヘッダー行、データ行、集計、署名欄の順に上から配置する。
/// 表の行がページに収まらない場合は改ページしてヘッダー行を繰り返す。
pub fn layout(timesheet: &Timesheet, columns: ColumnLayout) -> Vec<Page> {
    let header = HEADER.map(String::from);
    let rows = timesheet
        .rows
        .iter()
        .map(|row| row.cells())
        .collect::<Vec<_>>();
    let widths = column_widths(columns, &header, &rows);
    debug!("Column widths: {:?}", widths);

    let mut layouter = Layouter::new();
    layouter.paragraph(&timesheet.heading(), Font::Bold, TITLE_SIZE, TITLE_LEADING);
    layouter.space(12.0);

    layouter.table(&widths, &header, &rows);
    layouter.space(12.0);

    let [minutes, real, decimal] = timesheet.summary.lines();
    layouter.paragraph(&minutes, Font::Regular, BODY_SIZE, BODY_LEADING);
    layouter.space(6.0);
    layouter.paragraph(&real, Font::Regular, BODY_SIZE, BODY_LEADING);
    layouter.space(6.0);
    layouter.paragraph(&decimal, Font::Regular, BODY_SIZE, BODY_LEADING);
    layouter.space(12.0);

    let underline = "_".repeat(SIGNATURE_UNDERLINE);
    layouter.paragraph(
        &format!("Datum: {}", underline),
        Font::Regular,
        BODY_SIZE,
        BODY_LEADING,
    );
    layouter.space(6.0);
    layouter.paragraph(
        &format!("Unterschrift: {}", underline),
        Font::Regular,
        BODY_SIZE,
        BODY_LEADING,
    );

    layouter.pages
}

/// 列幅を決める。
fn column_widths(columns: ColumnLayout, header: &[String; 5], rows: &[[String; 5]]) -> [f32; 5] {
    let available = content_width();

    let mut leading = match columns {
        ColumnLayout::Fixed => FIXED_WIDTHS,
        ColumnLayout::Auto => {
            let mut widths = [0.0_f32; 4];
            for (i, width) in widths.iter_mut().enumerate() {
                let header_width = text_width(&header[i], Font::Bold, BODY_SIZE);
                let content_width = rows
                    .iter()
                    .map(|row| text_width(&row[i], Font::Regular, BODY_SIZE))
                    .fold(header_width, f32::max);
                *width = (content_width + 2.0 * CELL_PADDING).ceil();
            }
            widths
        }
    };

    // 説明の列に最低でも1/3の幅を残す
    let limit = available * 2.0 / 3.0;
    let total: f32 = leading.iter().sum();
    if total > limit {
        leading.iter_mut().for_each(|width| *width *= limit / total);
    }

    let comment = available - leading.iter().sum::<f32>();
    [leading[0], leading[1], leading[2], leading[3], comment]
}

fn content_width() -> f32 {
    PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT
}

/// 上から順に要素を配置していく。
struct Layouter {
    pages: Vec<Page>,
    cursor: f32,
}

impl Layouter {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            cursor: PAGE_HEIGHT - MARGIN_TOP,
        }
    }

    fn remaining(&self) -> f32 {
        self.cursor - MARGIN_BOTTOM
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = PAGE_HEIGHT - MARGIN_TOP;
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn space(&mut self, height: f32) {
        self.cursor = (self.cursor - height).max(MARGIN_BOTTOM);
    }

    /// 本文の幅で折り返したテキストを配置する。
    fn paragraph(&mut self, text: &str, font: Font, size: f32, leading: f32) {
        for line in wrap(text, content_width(), font, size) {
            if self.remaining() < leading {
                self.new_page();
            }
            self.push(DrawOp::Text {
                x: MARGIN_LEFT,
                y: self.cursor - size,
                font,
                size,
                text: line,
            });
            self.cursor -= leading;
        }
    }

    /// 罫線付きの表を配置する。
    fn table(&mut self, widths: &[f32; 5], header: &[String; 5], rows: &[[String; 5]]) {
        let header_lines = cell_lines(header, widths, Font::Bold);
        let header_height = row_height(&header_lines);
        let page_capacity = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM - header_height;

        if header_height > self.remaining() {
            self.new_page();
        }
        self.row(widths, &header_lines, Font::Bold, &[false; 5]);

        for cells in rows {
            let mut lines = cell_lines(cells, widths, Font::Regular);
            loop {
                let height = row_height(&lines);
                if height <= self.remaining() {
                    self.row(widths, &lines, Font::Regular, &BODY_RIGHT_ALIGNED);
                    break;
                }

                if height > page_capacity {
                    // 1ページに収まらない行は、入る分だけ配置して残りを次のページに回す
                    let fit = ((self.remaining() - 2.0 * CELL_PADDING) / BODY_LEADING).floor();
                    if fit >= 1.0 {
                        let rest = split_lines(&mut lines, fit as usize);
                        self.row(widths, &lines, Font::Regular, &BODY_RIGHT_ALIGNED);
                        lines = rest;
                    }
                }

                self.new_page();
                self.row(widths, &header_lines, Font::Bold, &[false; 5]);
            }
        }
    }

    /// 表の1行を現在位置に配置する。`right_aligned`の列はセルの右端に揃える。
    fn row(
        &mut self,
        widths: &[f32; 5],
        lines: &[Vec<String>],
        font: Font,
        right_aligned: &[bool; 5],
    ) {
        let top = self.cursor;
        let bottom = top - row_height(lines);
        let right = MARGIN_LEFT + widths.iter().sum::<f32>();

        let mut x = MARGIN_LEFT;
        for ((cell, width), align_right) in lines.iter().zip(widths).zip(right_aligned) {
            for (i, line) in cell.iter().enumerate() {
                let text_x = if *align_right {
                    let inner = x + width - CELL_PADDING - text_width(line, font, BODY_SIZE);
                    inner.max(x + CELL_PADDING)
                } else {
                    x + CELL_PADDING
                };
                self.push(DrawOp::Text {
                    x: text_x,
                    y: top - CELL_PADDING - BODY_SIZE - i as f32 * BODY_LEADING,
                    font,
                    size: BODY_SIZE,
                    text: line.clone(),
                });
            }
            x += width;
        }

        for y in [top, bottom] {
            self.push(DrawOp::Line {
                x1: MARGIN_LEFT,
                y1: y,
                x2: right,
                y2: y,
            });
        }
        let mut x = MARGIN_LEFT;
        self.push(DrawOp::Line {
            x1: x,
            y1: top,
            x2: x,
            y2: bottom,
        });
        for width in widths {
            x += width;
            self.push(DrawOp::Line {
                x1: x,
                y1: top,
                x2: x,
                y2: bottom,
            });
        }

        self.cursor = bottom;
    }
}

/// 各セルを列幅で折り返した行に分ける。
fn cell_lines(cells: &[String; 5], widths: &[f32; 5], font: Font) -> Vec<Vec<String>> {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| wrap(cell, width - 2.0 * CELL_PADDING, font, BODY_SIZE))
        .collect()
}

fn row_height(lines: &[Vec<String>]) -> f32 {
    let count = lines.iter().map(Vec::len).max().unwrap_or(0).max(1);
    count as f32 * BODY_LEADING + 2.0 * CELL_PADDING
}

/// 各セルの先頭`count`行を残し、残りの行を返す。
fn split_lines(lines: &mut [Vec<String>], count: usize) -> Vec<Vec<String>> {
    lines
        .iter_mut()
        .map(|cell| {
            if cell.len() > count {
                cell.split_off(count)
            } else {
                Vec::new()
            }
        })
        .collect()
}

/// テキストを指定された幅で折り返す。
///
/// 単語単位で折り返し、1語で幅を超える場合は文字単位で分割する。改行はそのまま改行として扱う。
fn wrap(text: &str, max_width: f32, font: Font, size: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(&candidate, font, size) <= max_width {
                line = candidate;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                line.push(c);
                if text_width(&line, font, size) > max_width && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::replace(&mut line, c.to_string()));
                }
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines
}

/// Helveticaの文字幅(1000分率)。WinAnsiEncodingの0x20から0xFFまで。未定義の位置は1000とする。
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0x30
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 0x50
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 0x60
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 1000, // 0x70
    556, 1000, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 1000, 611, 1000, // 0x80
    1000, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 1000, 500, 667, // 0x90
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 0xF0
];

/// Helvetica-Boldの文字幅(1000分率)。並びは`HELVETICA_WIDTHS`と同じ。
const HELVETICA_BOLD_WIDTHS: [u16; 224] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0x30
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 0x50
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 0x60
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 1000, // 0x70
    556, 1000, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 1000, 611, 1000, // 0x80
    1000, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 1000, 500, 667, // 0x90
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556, // 0xF0
];

/// テキストの描画幅(pt)。PDFに書き出すWinAnsiEncodingのバイト列で測る。
fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let widths = match font {
        Font::Regular => &HELVETICA_WIDTHS,
        Font::Bold => &HELVETICA_BOLD_WIDTHS,
    };
    let units: u32 = encode_win_ansi(text)
        .into_iter()
        .map(|byte| {
            usize::from(byte)
                .checked_sub(0x20)
                .and_then(|index| widths.get(index))
                .map_or(1000, |width| u32::from(*width))
        })
        .sum();
    units as f32 * size / 1000.0
}

/// テキストをWinAnsiEncodingのバイト列にする。表現できない文字は`?`にする。
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            0x09 => b' ',
            _ => match c {
                '€' => 0x80,
                '‚' => 0x82,
                '„' => 0x84,
                '…' => 0x85,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                _ => b'?',
            },
        })
        .collect()
}

fn render_error<E: std::fmt::Display>(e: E) -> FastBillError {
    FastBillError::Render(e.to_string())
}

/// レイアウト済みのページをPDFのバイト列にする。
pub fn render(pages: &[Page]) -> Result<Vec<u8>, FastBillError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular_id,
            Font::Bold.resource_name() => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let mut operations = vec![Operation::new("w", vec![GRID_WIDTH.into()])];
        operations.extend(page.ops.iter().flat_map(operations_for));
        let content = Content { operations };

        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(render_error)?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            PAGE_WIDTH.into(),
            PAGE_HEIGHT.into(),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(render_error)?;

    Ok(buffer)
}

/// 描画要素をPDFの描画命令にする。
fn operations_for(op: &DrawOp) -> Vec<Operation> {
    match op {
        DrawOp::Text {
            x,
            y,
            font,
            size,
            text,
        } => vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), (*size).into()]),
            Operation::new("Td", vec![(*x).into(), (*y).into()]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
        DrawOp::Line { x1, y1, x2, y2 } => vec![
            Operation::new("m", vec![(*x1).into(), (*y1).into()]),
            Operation::new("l", vec![(*x2).into(), (*y2).into()]),
            Operation::new("S", vec![]),
        ],
    }
}
