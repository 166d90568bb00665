use crate::error::FastBillError;
use crate::time_entry::TimeEntry;

/// 表のヘッダー行。
pub const HEADER: [&str; 5] = ["Datum", "Beginn", "Ende", "Dauer", "Tätigkeitsbeschreibung"];

/// タイムシートの1行。
///
/// フィールドの順序がそのまま並び順になる。日付、開始時刻、終了時刻、分、コメントの順に比較する。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimesheetRow {
    pub date: String,
    pub start: String,
    pub end: String,
    pub minutes: u64,
    pub comment: String,
}

impl TimesheetRow {
    /// 表に表示するセルの値。
    pub fn cells(&self) -> [String; 5] {
        [
            self.date.clone(),
            self.start.clone(),
            self.end.clone(),
            self.minutes.to_string(),
            self.comment.clone(),
        ]
    }
}

impl TryFrom<&TimeEntry> for TimesheetRow {
    type Error = FastBillError;

    fn try_from(entry: &TimeEntry) -> Result<Self, Self::Error> {
        let date = required(&entry.date, "DATE")?;
        let date = date
            .get(..10)
            .ok_or_else(|| FastBillError::Validation(format!("DATE '{}' is too short", date)))?;

        let start = time_of_day(required(&entry.start_time, "START_TIME")?, "START_TIME")?;
        let end = time_of_day(required(&entry.end_time, "END_TIME")?, "END_TIME")?;

        let minutes = required(&entry.billable_minutes, "BILLABLE_MINUTES")?;
        let minutes = minutes.trim().parse::<u64>().map_err(|_| {
            FastBillError::Validation(format!("BILLABLE_MINUTES '{}' is not a number", minutes))
        })?;

        Ok(Self {
            date: date.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            minutes,
            comment: entry.comment.clone().unwrap_or_default(),
        })
    }
}

/// 合計時間。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_minutes: u64,
}

impl Summary {
    /// 実時間を`時:分`の形式で返す。
    pub fn real_hours(&self) -> String {
        format!("{}:{:02}", self.total_minutes / 60, self.total_minutes % 60)
    }

    /// 10進数の時間を小数点以下2桁に丸めて返す。
    pub fn decimal_hours(&self) -> f64 {
        (self.total_minutes as f64 / 60.0 * 100.0).round() / 100.0
    }

    /// 10進数の時間を表示用の文字列にする。整数でも小数点以下1桁は表示する。
    pub fn decimal_hours_label(&self) -> String {
        let hours = self.decimal_hours();
        if hours.fract() == 0.0 {
            format!("{:.1}", hours)
        } else {
            format!("{}", hours)
        }
    }

    /// フッターに表示する集計行。
    pub fn lines(&self) -> [String; 3] {
        [
            format!("Summe Minuten: {}", self.total_minutes),
            format!("Summe Stunden (real): {}", self.real_hours()),
            format!("Summe Stunden (dec): {}", self.decimal_hours_label()),
        ]
    }
}

/// PDFに出力するタイムシート。
#[derive(Clone, Debug, PartialEq)]
pub struct Timesheet {
    pub title: String,
    pub username: String,
    pub rows: Vec<TimesheetRow>,
    pub summary: Summary,
}

impl Timesheet {
    /// タイムエントリーからタイムシートを作成する。
    ///
    /// 1件でも不正なエントリーがあればエラーを返し、タイムシートは作成しない。
    ///
    /// # Arguments
    ///
    /// * `entries` - 順不同のタイムエントリー
    /// * `title` - タイトルに表示する文字列(対象の年月)
    /// * `username` - タイトルに表示するユーザー名
    pub fn build(entries: &[TimeEntry], title: &str, username: &str) -> Result<Self, FastBillError> {
        let mut rows = entries
            .iter()
            .map(TimesheetRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort();

        let total_minutes = rows
            .iter()
            .try_fold(0_u64, |total, row| total.checked_add(row.minutes))
            .ok_or_else(|| FastBillError::Validation("total minutes overflow".to_string()))?;

        Ok(Self {
            title: title.to_string(),
            username: username.to_string(),
            rows,
            summary: Summary { total_minutes },
        })
    }

    /// タイトル行。
    pub fn heading(&self) -> String {
        format!("Leistungsnachweis: {} - {}", self.title, self.username)
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, FastBillError> {
    value
        .as_deref()
        .ok_or_else(|| FastBillError::Validation(format!("{} is missing", field)))
}

/// 日時の文字列から`時:分`だけを取り出す。
///
/// `YYYY-MM-DD hh:mm:ss`、`YYYY-MM-DDThh:mm:ssZ`、`hh:mm:ss`のいずれも受け付ける。
fn time_of_day<'a>(value: &'a str, field: &str) -> Result<&'a str, FastBillError> {
    let bytes = value.as_bytes();
    let time = if bytes.len() >= 16 && matches!(bytes[10], b' ' | b'T') {
        value.get(11..16)
    } else {
        value.get(..5)
    };

    match time {
        Some(time) if time.as_bytes().get(2) == Some(&b':') => Ok(time),
        _ => Err(FastBillError::Validation(format!(
            "{} '{}' has no time of day",
            field, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{time_of_day, Summary, Timesheet, TimesheetRow};
    use crate::error::FastBillError;
    use crate::time_entry::TimeEntry;

    fn entry(date: &str, start: &str, end: &str, minutes: &str, comment: &str) -> TimeEntry {
        TimeEntry {
            date: Some(format!("{} 00:00:00", date)),
            start_time: Some(format!("{} {}:00", date, start)),
            end_time: Some(format!("{} {}:00", date, end)),
            billable_minutes: Some(minutes.to_string()),
            comment: Some(comment.to_string()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::zero(0, "0:00", 0.0, "0.0")]
    #[case::half(150, "2:30", 2.5, "2.5")]
    #[case::rounded(125, "2:05", 2.08, "2.08")]
    #[case::rounded_down(101, "1:41", 1.68, "1.68")]
    #[case::rounded_up(103, "1:43", 1.72, "1.72")]
    #[case::whole(180, "3:00", 3.0, "3.0")]
    #[case::more_than_a_day(1625, "27:05", 27.08, "27.08")]
    fn test_summary(
        #[case] total_minutes: u64,
        #[case] real: &str,
        #[case] decimal: f64,
        #[case] decimal_label: &str,
    ) {
        let summary = Summary { total_minutes };

        assert_eq!(summary.real_hours(), real);
        assert_eq!(summary.decimal_hours(), decimal);
        assert_eq!(summary.decimal_hours_label(), decimal_label);
    }

    #[test]
    fn test_build_three_entries() {
        let entries = vec![
            entry("2024-03-05", "13:00", "14:30", "90", "Review"),
            entry("2024-03-04", "09:00", "10:00", "60", "Planning"),
            entry("2024-03-06", "08:00", "08:30", "30", "Standup"),
        ];

        let timesheet = Timesheet::build(&entries, "2024-03", "jdoe").unwrap();

        assert_eq!(timesheet.summary.total_minutes, 180);
        assert_eq!(timesheet.summary.real_hours(), "3:00");
        assert_eq!(timesheet.summary.decimal_hours(), 3.0);
        assert_eq!(
            timesheet
                .rows
                .iter()
                .map(|row| row.date.as_str())
                .collect::<Vec<_>>(),
            vec!["2024-03-04", "2024-03-05", "2024-03-06"]
        );
        assert_eq!(
            timesheet.rows[0].cells(),
            ["2024-03-04", "09:00", "10:00", "60", "Planning"].map(String::from)
        );
        assert_eq!(timesheet.heading(), "Leistungsnachweis: 2024-03 - jdoe");
    }

    #[test]
    fn test_build_empty() {
        let timesheet = Timesheet::build(&[], "2024-03", "jdoe").unwrap();

        assert!(timesheet.rows.is_empty());
        assert_eq!(
            timesheet.summary.lines(),
            [
                "Summe Minuten: 0",
                "Summe Stunden (real): 0:00",
                "Summe Stunden (dec): 0.0",
            ]
            .map(String::from)
        );
    }

    /// 同じ日付の行は開始時刻、終了時刻、分、コメントの順で並ぶ。
    #[test]
    fn test_build_sorts_by_whole_row() {
        let entries = vec![
            entry("2024-03-04", "14:00", "15:00", "60", "b"),
            entry("2024-03-04", "09:00", "11:00", "120", "a"),
            entry("2024-03-04", "09:00", "10:00", "60", "z"),
            entry("2024-03-04", "09:00", "10:00", "60", "c"),
            entry("2024-03-01", "16:00", "17:00", "60", "d"),
        ];

        let timesheet = Timesheet::build(&entries, "2024-03", "jdoe").unwrap();

        let order = timesheet
            .rows
            .iter()
            .map(|row| (row.date.as_str(), row.start.as_str(), row.comment.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("2024-03-01", "16:00", "d"),
                ("2024-03-04", "09:00", "c"),
                ("2024-03-04", "09:00", "z"),
                ("2024-03-04", "09:00", "a"),
                ("2024-03-04", "14:00", "b"),
            ]
        );
    }

    #[rstest]
    #[case::not_a_number("sixty")]
    #[case::empty("")]
    #[case::negative("-5")]
    #[case::fraction("1.5")]
    fn test_build_rejects_invalid_minutes(#[case] minutes: &str) {
        let entries = vec![
            entry("2024-03-04", "09:00", "10:00", "60", "ok"),
            entry("2024-03-05", "09:00", "10:00", minutes, "broken"),
        ];

        let result = Timesheet::build(&entries, "2024-03", "jdoe");

        assert!(matches!(result, Err(FastBillError::Validation(_))));
    }

    /// 合計がu64に収まらない場合はパニックせずにエラーを返す。
    #[test]
    fn test_build_rejects_total_overflow() {
        let entries = vec![
            entry("2024-03-04", "09:00", "10:00", "18446744073709551615", "huge"),
            entry("2024-03-05", "09:00", "10:00", "1", "one more"),
        ];

        let result = Timesheet::build(&entries, "2024-03", "jdoe");

        assert!(matches!(
            result,
            Err(FastBillError::Validation(message)) if message == "total minutes overflow"
        ));
    }

    #[test]
    fn test_build_total_at_limit() {
        let entries = vec![
            entry("2024-03-04", "09:00", "10:00", "18446744073709551614", "huge"),
            entry("2024-03-05", "09:00", "10:00", "1", "one more"),
        ];

        let timesheet = Timesheet::build(&entries, "2024-03", "jdoe").unwrap();

        assert_eq!(timesheet.summary.total_minutes, u64::MAX);
    }

    #[rstest]
    #[case::no_date(TimeEntry { date: None, ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    #[case::no_start(TimeEntry { start_time: None, ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    #[case::no_end(TimeEntry { end_time: None, ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    #[case::no_minutes(TimeEntry { billable_minutes: None, ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    #[case::short_date(TimeEntry { date: Some("2024-03".to_string()), ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    #[case::bad_time(TimeEntry { start_time: Some("morning".to_string()), ..entry("2024-03-04", "09:00", "10:00", "60", "") })]
    fn test_row_rejects_incomplete_entry(#[case] input: TimeEntry) {
        assert!(matches!(
            TimesheetRow::try_from(&input),
            Err(FastBillError::Validation(_))
        ));
    }

    #[test]
    fn test_row_without_comment() {
        let input = TimeEntry {
            comment: None,
            ..entry("2024-03-04", "09:00", "10:00", " 60 ", "")
        };

        let row = TimesheetRow::try_from(&input).unwrap();

        assert_eq!(row.comment, "");
        assert_eq!(row.minutes, 60);
    }

    #[rstest]
    #[case::space_separated("2024-03-04 09:15:00", "09:15")]
    #[case::iso_with_zone("2024-03-04T09:15:00Z", "09:15")]
    #[case::iso_with_offset("2024-03-04T09:15:00+01:00", "09:15")]
    #[case::time_only("09:15:00", "09:15")]
    #[case::hour_minute("09:15", "09:15")]
    fn test_time_of_day(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(time_of_day(input, "START_TIME").unwrap(), expected);
    }
}
