use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::datetime;
use crate::fastbill::{TimeEntryQuery, TimeEntryRepository};
use crate::month::YearMonth;
use crate::pdf::{build_report, ColumnLayout};

/// 出力ファイル名の接頭辞。
const FILE_PREFIX: &str = "Leistungsnachweis_Projekt";

/// タイムシート作成の引数。
#[derive(Debug, clap::Args)]
pub struct TimesheetArgs {
    #[clap(help = "FastBill project id")]
    project_id: String,

    #[clap(
        help = "Month in the format YYYY-MM, defaults to the previous month",
        parse(try_from_str)
    )]
    month: Option<YearMonth>,

    #[clap(short = 'c', long = "customer", help = "Only include entries of this customer id")]
    customer_id: Option<String>,

    #[clap(
        short = 'o',
        long = "output-dir",
        help = "Directory to write the PDF to",
        default_value = ".",
        parse(from_os_str)
    )]
    output_dir: PathBuf,

    #[clap(
        long = "layout",
        help = "Column layout of the table",
        arg_enum,
        default_value = "fixed"
    )]
    layout: ColumnLayout,
}

pub struct TimesheetCommand<'a, T: TimeEntryRepository> {
    repository: &'a T,
    username: &'a str,
}

impl<'a, T: TimeEntryRepository> TimesheetCommand<'a, T> {
    /// 新しい`TimesheetCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - タイムエントリーを取得するためのリポジトリ
    /// * `username` - ファイル名とタイトルに使うユーザー名
    pub fn new(repository: &'a T, username: &'a str) -> Self {
        Self {
            repository,
            username,
        }
    }

    /// 指定された月のタイムエントリーを取得し、PDFのタイムシートを出力する。
    ///
    /// 月が指定されていない場合は、Localタイムゾーンで前月を利用する。
    /// 書き出したファイルのパスを返す。
    pub async fn run(&self, args: TimesheetArgs) -> Result<PathBuf> {
        let month = match args.month {
            Some(month) => month,
            None => YearMonth::previous_of(datetime::today())
                .context("Failed to determine the previous month")?,
        };
        info!("Project: {}, Month: {}", args.project_id, month);

        let query = TimeEntryQuery {
            month,
            customer_id: args.customer_id,
            project_id: Some(args.project_id.clone()),
        };
        let time_entries = self
            .repository
            .read_time_entries(&query)
            .await
            .context("Failed to retrieve time entries")?;
        info!("Time entries retrieved successfully.");

        let title = month.to_string();
        let output_path = args.output_dir.join(format!(
            "{}_{}_{}_{}",
            FILE_PREFIX, args.project_id, title, self.username
        ));
        let path = build_report(
            &time_entries,
            &title,
            self.username,
            &output_path,
            args.layout,
        )
        .with_context(|| format!("Failed to create timesheet {}.pdf", output_path.display()))?;

        Ok(path)
    }
}
