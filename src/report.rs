//! HR-side aggregation over loaded responses.

use std::collections::BTreeMap;
use chrono::{Datelike, NaiveDate};

use crate::db::{matches_dates, Response};
use crate::survey::round2;

pub const CRITICAL_STRESS: f64 = 7.0;
pub const CRITICAL_MOTIVATION: f64 = 4.0;

/// Department and inclusive date bounds. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub department: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Filter {
    pub fn has_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.department.is_none() && !self.has_dates()
    }

    /// A response with an unknown timestamp only matches when no date
    /// bound is set.
    pub fn matches(&self, response: &Response) -> bool {
        if let Some(dept) = &self.department {
            if &response.department != dept {
                return false;
            }
        }

        matches_dates(response.date(), self.start_date, self.end_date)
    }

    pub fn apply<'a>(&self, responses: &'a [Response]) -> Vec<&'a Response> {
        responses.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DepartmentSummary {
    pub department: String,
    pub stress: f64,
    pub motivation: f64,
    pub responses: usize,
}

impl DepartmentSummary {
    pub fn is_critical(&self) -> bool {
        self.stress >= CRITICAL_STRESS || self.motivation <= CRITICAL_MOTIVATION
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub stress: f64,
    pub motivation: f64,
    pub responses: usize,
}

/// Mean of each of the six sub-questions over a group of responses.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionMeans {
    pub label: String,
    pub stress: [f64; 3],
    pub motivation: [f64; 3],
}

#[derive(Default)]
struct Accumulator {
    stress: f64,
    motivation: f64,
    questions: [f64; 6],
    count: usize,
}

impl Accumulator {
    fn add(&mut self, response: &Response) {
        let r = &response.ratings;
        self.stress += r.stress_avg();
        self.motivation += r.motivation_avg();
        for (i, v) in r.stress.iter().chain(r.motivation.iter()).enumerate() {
            self.questions[i] += *v as f64;
        }
        self.count += 1;
    }

    fn mean(&self, total: f64) -> f64 {
        round2(total / self.count as f64)
    }
}

fn group_by<K: Ord>(
    responses: &[&Response],
    key: impl Fn(&Response) -> Option<K>,
) -> BTreeMap<K, Accumulator> {
    let mut groups: BTreeMap<K, Accumulator> = BTreeMap::new();
    for &response in responses {
        if let Some(k) = key(response) {
            groups.entry(k).or_default().add(response);
        }
    }
    groups
}

/// Average stress and motivation per department, alphabetical.
pub fn summarize_by_department(responses: &[&Response]) -> Vec<DepartmentSummary> {
    group_by(responses, |r| Some(r.department.clone()))
        .into_iter()
        .map(|(department, acc)| DepartmentSummary {
            department,
            stress: acc.mean(acc.stress),
            motivation: acc.mean(acc.motivation),
            responses: acc.count,
        })
        .collect()
}

/// Summary of a set of responses as a single group, or `None` if empty.
pub fn summarize(label: &str, responses: &[&Response]) -> Option<DepartmentSummary> {
    let acc = group_by(responses, |_| Some(())).remove(&())?;
    Some(DepartmentSummary {
        department: label.to_string(),
        stress: acc.mean(acc.stress),
        motivation: acc.mean(acc.motivation),
        responses: acc.count,
    })
}

pub fn critical_departments(summaries: &[DepartmentSummary]) -> Vec<&DepartmentSummary> {
    summaries.iter().filter(|s| s.is_critical()).collect()
}

/// Averages per calendar month. Responses without a timestamp are skipped.
pub fn monthly_trend(responses: &[&Response]) -> Vec<MonthlyTrend> {
    group_by(responses, |r| r.date().map(|d| (d.year(), d.month())))
        .into_iter()
        .map(|((year, month), acc)| MonthlyTrend {
            month: format!("{:04}-{:02}", year, month),
            stress: acc.mean(acc.stress),
            motivation: acc.mean(acc.motivation),
            responses: acc.count,
        })
        .collect()
}

fn question_means_of(label: String, acc: &Accumulator) -> QuestionMeans {
    let q = acc.questions;
    QuestionMeans {
        label,
        stress: [acc.mean(q[0]), acc.mean(q[1]), acc.mean(q[2])],
        motivation: [acc.mean(q[3]), acc.mean(q[4]), acc.mean(q[5])],
    }
}

pub fn question_means_by_department(responses: &[&Response]) -> Vec<QuestionMeans> {
    group_by(responses, |r| Some(r.department.clone()))
        .into_iter()
        .map(|(department, acc)| question_means_of(department, &acc))
        .collect()
}

pub fn question_means(label: &str, responses: &[&Response]) -> Option<QuestionMeans> {
    let acc = group_by(responses, |_| Some(())).remove(&())?;
    Some(question_means_of(label.to_string(), &acc))
}

/// Timeframe in a format like "September 15 - October 15, 2025".
pub fn timeframe_label(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> String {
    let full_date_fmt: &str = "%B %-d, %Y";
    let month_day_fmt: &str = "%B %-d";
    let day_year_fmt: &str = "%-d, %Y";

    match (start_date, end_date) {
        (Some(sdate), Some(edate)) => {
            let (sdate_str, edate_str) = if sdate.year() == edate.year() {
                if sdate.month() == edate.month() {
                    (sdate.format(month_day_fmt), edate.format(day_year_fmt))
                } else {
                    (sdate.format(month_day_fmt), edate.format(full_date_fmt))
                }
            } else {
                (sdate.format(full_date_fmt), edate.format(full_date_fmt))
            };

            format!("{} - {}", sdate_str, edate_str)
        }
        (Some(sdate), None) => format!("Since {}", sdate.format(full_date_fmt)),
        (None, Some(edate)) => format!("Until {}", edate.format(full_date_fmt)),
        (None, None) => "All time".to_string(),
    }
}
