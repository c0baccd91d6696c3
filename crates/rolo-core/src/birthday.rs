//! Upcoming-birthday windows.
//!
//! A window starts on a calendar date and spans `days` further days,
//! inclusive. Birthdays are compared by month and day only, so the window
//! wraps across month and year boundaries. A 29 February birthday sorts
//! between 28 February and 1 March and is therefore picked up by any window
//! covering that gap, leap year or not.

use chrono::{Datelike, Days, NaiveDate};

/// `days` at or beyond this value cover every possible birthday.
pub const FULL_YEAR_DAYS: u32 = 365;

/// A month/day pair, ordered chronologically within a year.
pub type MonthDay = (u32, u32);

/// The `[start, start + days]` range of anniversaries to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdayWindow {
  pub start: NaiveDate,
  pub days:  u32,
}

/// How a [`BirthdayWindow`] constrains `(month, day)` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthDayRange {
  /// Every birthday matches.
  All,
  /// `from <= md <= to`.
  Within { from: MonthDay, to: MonthDay },
  /// The window crosses New Year: `md >= from || md <= to`.
  Wrapping { from: MonthDay, to: MonthDay },
}

impl BirthdayWindow {
  pub fn new(start: NaiveDate, days: u32) -> Self { Self { start, days } }

  /// Last day of the window. Saturates at the end of the calendar.
  pub fn end(&self) -> NaiveDate {
    self
      .start
      .checked_add_days(Days::new(u64::from(self.days)))
      .unwrap_or(NaiveDate::MAX)
  }

  pub fn range(&self) -> MonthDayRange {
    if self.days >= FULL_YEAR_DAYS {
      return MonthDayRange::All;
    }
    let from = month_day(self.start);
    let to = month_day(self.end());
    if from <= to {
      MonthDayRange::Within { from, to }
    } else {
      MonthDayRange::Wrapping { from, to }
    }
  }

  /// Whether a contact born on `birthday` celebrates within the window.
  pub fn contains(&self, birthday: NaiveDate) -> bool {
    let md = month_day(birthday);
    match self.range() {
      MonthDayRange::All => true,
      MonthDayRange::Within { from, to } => from <= md && md <= to,
      MonthDayRange::Wrapping { from, to } => md >= from || md <= to,
    }
  }
}

pub fn month_day(date: NaiveDate) -> MonthDay { (date.month(), date.day()) }

#[cfg(test)]
mod tests {
  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

  #[test]
  fn window_across_month_boundary() {
    let w = BirthdayWindow::new(d(2024, 1, 28), 7);
    assert_eq!(w.end(), d(2024, 2, 4));
    assert!(w.contains(d(1985, 2, 2)));
    assert!(w.contains(d(1985, 1, 28)));
    assert!(w.contains(d(1985, 2, 4)));
    assert!(!w.contains(d(1985, 1, 3)), "already passed this year");
    assert!(!w.contains(d(1985, 2, 5)));
  }

  #[test]
  fn window_across_new_year() {
    let w = BirthdayWindow::new(d(2023, 12, 29), 7);
    assert_eq!(w.range(), MonthDayRange::Wrapping { from: (12, 29), to: (1, 5) });
    assert!(w.contains(d(2000, 12, 31)));
    assert!(w.contains(d(2000, 1, 1)));
    assert!(!w.contains(d(2000, 1, 6)));
    assert!(!w.contains(d(2000, 12, 28)));
  }

  #[test]
  fn zero_days_is_today_only() {
    let w = BirthdayWindow::new(d(2024, 5, 10), 0);
    assert!(w.contains(d(1990, 5, 10)));
    assert!(!w.contains(d(1990, 5, 11)));
  }

  #[test]
  fn leap_day_between_feb_28_and_mar_1() {
    let w = BirthdayWindow::new(d(2023, 2, 28), 1);
    assert_eq!(w.end(), d(2023, 3, 1));
    assert!(w.contains(d(2000, 2, 29)));

    let w = BirthdayWindow::new(d(2023, 3, 1), 3);
    assert!(!w.contains(d(2000, 2, 29)));
  }

  #[test]
  fn full_year_matches_everything() {
    let w = BirthdayWindow::new(d(2024, 6, 1), FULL_YEAR_DAYS);
    assert_eq!(w.range(), MonthDayRange::All);
    assert!(w.contains(d(1970, 5, 31)));
  }

  #[test]
  fn end_saturates() {
    let w = BirthdayWindow::new(NaiveDate::MAX, 10);
    assert_eq!(w.end(), NaiveDate::MAX);
  }
}
