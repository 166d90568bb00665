use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::FastBillError;

/// 集計対象の年月。
///
/// 月初と月末の日付を保持する。どちらも両端を含む期間として扱う。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YearMonth {
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl YearMonth {
    /// 新しい`YearMonth`を返す。
    ///
    /// 月末は月初から32日進めて翌月に入り、その月の1日から1日戻すことで求める。
    /// 月が1~12の範囲外の場合はエラーを返す。
    pub fn new(year: i32, month: u32) -> Result<Self, FastBillError> {
        let invalid = || FastBillError::Format(format!("{:04}-{:02}", year, month));

        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let last_day = first_day
            .checked_add_signed(Duration::days(32))
            .and_then(|next_month| next_month.with_day(1))
            .and_then(|next_first| next_first.pred_opt())
            .ok_or_else(invalid)?;

        Ok(Self {
            first_day,
            last_day,
        })
    }

    /// 指定された日付の前月を返す。
    pub fn previous_of(date: NaiveDate) -> Result<Self, FastBillError> {
        let last_of_previous = date
            .with_day(1)
            .and_then(|first| first.pred_opt())
            .ok_or_else(|| FastBillError::Format(format!("month before {}", date)))?;

        Self::new(last_of_previous.year(), last_of_previous.month())
    }

    /// 月初の日付。
    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// 月末の日付。
    pub fn last_day(&self) -> NaiveDate {
        self.last_day
    }
}

impl FromStr for YearMonth {
    type Err = FastBillError;

    /// `YYYY-MM`形式の文字列をパースする。月は1桁も許容する。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FastBillError::Format(s.to_string());

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !(1..=2).contains(&month.len()) || !month.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day.format("%Y-%m"))
    }
}
