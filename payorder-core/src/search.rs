use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::OrderView;
use crate::{OrderError, OrderResult};

/// Optional criteria accepted by the order search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Id,
    InvoiceNumber,
    ManagementAccount,
    Supplier,
    Branch,
    InvoiceSeries,
    PaymentMethod,
    ItemCount,
    PostingDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Case-insensitive substring on a text column.
    Contains,
    /// Prefix on the column's textual form.
    Prefix,
}

impl SearchField {
    pub const ALL: [SearchField; 9] = [
        SearchField::Id,
        SearchField::InvoiceNumber,
        SearchField::ManagementAccount,
        SearchField::Supplier,
        SearchField::Branch,
        SearchField::InvoiceSeries,
        SearchField::PaymentMethod,
        SearchField::ItemCount,
        SearchField::PostingDate,
    ];

    pub fn column(self) -> &'static str {
        match self {
            SearchField::Id => "o.id",
            SearchField::InvoiceNumber => "o.invoice_number",
            SearchField::ManagementAccount => "o.management_account",
            SearchField::Supplier => "o.supplier_name",
            SearchField::Branch => "o.branch",
            SearchField::InvoiceSeries => "o.invoice_series",
            SearchField::PaymentMethod => "o.payment_method",
            SearchField::ItemCount => "o.item_count",
            SearchField::PostingDate => "o.posting_date",
        }
    }

    pub fn match_kind(self) -> MatchKind {
        match self {
            SearchField::Id | SearchField::ItemCount | SearchField::PostingDate => MatchKind::Prefix,
            _ => MatchKind::Contains,
        }
    }
}

/// Sparse set of search inputs. Absent or blank fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub id: Option<String>,
    pub invoice_number: Option<String>,
    pub management_account: Option<String>,
    pub supplier: Option<String>,
    pub branch: Option<String>,
    pub invoice_series: Option<String>,
    pub payment_method: Option<String>,
    pub item_count: Option<String>,
    pub posting_date: Option<String>,
}

impl SearchCriteria {
    fn slot(&self, field: SearchField) -> &Option<String> {
        match field {
            SearchField::Id => &self.id,
            SearchField::InvoiceNumber => &self.invoice_number,
            SearchField::ManagementAccount => &self.management_account,
            SearchField::Supplier => &self.supplier,
            SearchField::Branch => &self.branch,
            SearchField::InvoiceSeries => &self.invoice_series,
            SearchField::PaymentMethod => &self.payment_method,
            SearchField::ItemCount => &self.item_count,
            SearchField::PostingDate => &self.posting_date,
        }
    }

    pub fn get(&self, field: SearchField) -> Option<&str> {
        self.slot(field)
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: SearchField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            SearchField::Id => self.id = value,
            SearchField::InvoiceNumber => self.invoice_number = value,
            SearchField::ManagementAccount => self.management_account = value,
            SearchField::Supplier => self.supplier = value,
            SearchField::Branch => self.branch = value,
            SearchField::InvoiceSeries => self.invoice_series = value,
            SearchField::PaymentMethod => self.payment_method = value,
            SearchField::ItemCount => self.item_count = value,
            SearchField::PostingDate => self.posting_date = value,
        }
    }

    pub fn with(mut self, field: SearchField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }
}

/// A bound parameter. Never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Pattern(String),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Like { field: SearchField, kind: MatchKind },
    PostingDateBetween,
}

/// One conjunct of the predicate together with the 1-based positions of the
/// parameters it binds. Only `FilterBuilder` creates clauses, so a `Like`
/// always carries one placeholder and a date range two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    condition: Condition,
    placeholders: Vec<usize>,
}

impl Clause {
    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn placeholders(&self) -> &[usize] {
        &self.placeholders
    }

    fn render(&self) -> String {
        match (self.condition, self.placeholders.as_slice()) {
            (Condition::Like { field, kind: MatchKind::Contains }, [n]) => {
                format!("{} ILIKE ${}", field.column(), n)
            }
            (Condition::Like { field, kind: MatchKind::Prefix }, [n]) => {
                format!("CAST({} AS TEXT) LIKE ${}", field.column(), n)
            }
            (Condition::PostingDateBetween, [start, end]) => {
                format!("o.posting_date BETWEEN ${} AND ${}", start, end)
            }
            (condition, placeholders) => unreachable!(
                "{:?} built with {} placeholders",
                condition,
                placeholders.len()
            ),
        }
    }
}

/// Conjunctive filter over payment orders: clause templates plus positionally
/// aligned bound values. An empty predicate matches every order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    params: Vec<FilterValue>,
}

impl Predicate {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn params(&self) -> &[FilterValue] {
        &self.params
    }

    pub fn placeholder_count(&self) -> usize {
        self.clauses.iter().map(|c| c.placeholders.len()).sum()
    }

    /// `WHERE` fragment (with a leading space) or an empty string.
    pub fn where_sql(&self) -> String {
        let mut out = String::new();
        for (i, clause) in self.clauses.iter().enumerate() {
            out.push_str(if i == 0 { " WHERE " } else { " AND " });
            out.push_str(&clause.render());
        }
        out
    }

    /// Evaluate the predicate against an already projected order, with the
    /// same semantics as the SQL rendering.
    pub fn matches<T: SearchTarget + ?Sized>(&self, target: &T) -> bool {
        self.clauses.iter().all(|clause| {
            match (clause.condition, clause.placeholders.as_slice()) {
                (Condition::Like { field, kind }, [n]) => match self.param(*n) {
                    Some(FilterValue::Pattern(pattern)) => {
                        like(pattern, &target.field_text(field), kind == MatchKind::Contains)
                    }
                    _ => false,
                },
                (Condition::PostingDateBetween, [start, end]) => {
                    match (self.param(*start), self.param(*end)) {
                        (Some(FilterValue::Date(start)), Some(FilterValue::Date(end))) => {
                            let date = target.posting_date();
                            *start <= date && date <= *end
                        }
                        _ => false,
                    }
                }
                _ => false,
            }
        })
    }

    fn param(&self, placeholder: usize) -> Option<&FilterValue> {
        placeholder.checked_sub(1).and_then(|i| self.params.get(i))
    }
}

/// Accumulates (clause, values) pairs. Placeholder numbers are assigned from
/// the current parameter count, so they always line up with `params`.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    predicate: Predicate,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, condition: Condition, values: Vec<FilterValue>) {
        let first = self.predicate.params.len() + 1;
        let placeholders = (first..first + values.len()).collect();
        self.predicate.params.extend(values);
        self.predicate.clauses.push(Clause {
            condition,
            placeholders,
        });
    }

    pub fn like(&mut self, field: SearchField, raw: &str) -> &mut Self {
        let kind = field.match_kind();
        let escaped = escape_like(raw);
        let pattern = match kind {
            MatchKind::Contains => format!("%{}%", escaped),
            MatchKind::Prefix => format!("{}%", escaped),
        };
        self.push(Condition::Like { field, kind }, vec![FilterValue::Pattern(pattern)]);
        self
    }

    pub fn posting_between(&mut self, start: NaiveDate, end: NaiveDate) -> &mut Self {
        self.push(
            Condition::PostingDateBetween,
            vec![FilterValue::Date(start), FilterValue::Date(end)],
        );
        self
    }

    pub fn build(self) -> Predicate {
        self.predicate
    }
}

/// Build the conjunctive filter for the optional search fields.
pub fn build_filter(criteria: &SearchCriteria) -> Predicate {
    let mut builder = FilterBuilder::new();
    for field in SearchField::ALL {
        if let Some(value) = criteria.get(field) {
            builder.like(field, value);
        }
    }
    builder.build()
}

/// Build a closed posting-date range filter. Both bounds or neither.
pub fn build_date_range_filter(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> OrderResult<Predicate> {
    match (start, end) {
        (None, None) => Ok(Predicate::all()),
        (Some(start), Some(end)) if start <= end => {
            let mut builder = FilterBuilder::new();
            builder.posting_between(start, end);
            Ok(builder.build())
        }
        (Some(start), Some(end)) => Err(OrderError::structural(format!(
            "date range start {} is after end {}",
            start, end
        ))),
        _ => Err(OrderError::structural(
            "date range needs both a start and an end date",
        )),
    }
}

/// Values a predicate can be evaluated against outside the database.
pub trait SearchTarget {
    fn field_text(&self, field: SearchField) -> String;
    fn posting_date(&self) -> NaiveDate;
}

impl SearchTarget for OrderView {
    fn field_text(&self, field: SearchField) -> String {
        match field {
            SearchField::Id => self.id.to_string(),
            SearchField::InvoiceNumber => self.invoice_number.clone(),
            SearchField::ManagementAccount => self.management_account.clone(),
            SearchField::Supplier => self.supplier_name.clone(),
            SearchField::Branch => self.branch.clone(),
            SearchField::InvoiceSeries => self.invoice_series.clone(),
            SearchField::PaymentMethod => self.payment_method.clone(),
            SearchField::ItemCount => self.item_count.to_string(),
            SearchField::PostingDate => self.posting_date.format("%Y-%m-%d").to_string(),
        }
    }

    fn posting_date(&self) -> NaiveDate {
        self.posting_date
    }
}

/// Escape LIKE metacharacters with the default backslash escape.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    AnyRun,
    AnyOne,
    Literal(char),
}

/// SQL `LIKE` / `ILIKE` matching with backslash escapes.
pub fn like(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let fold = |c: char| {
        if case_insensitive {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        }
    };

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::AnyRun,
            '_' => Token::AnyOne,
            '\\' => Token::Literal(fold(chars.next().unwrap_or('\\'))),
            other => Token::Literal(fold(other)),
        });
    }
    let text: Vec<char> = text.chars().map(fold).collect();

    // reachable[j]: the pattern prefix consumed so far can end at text[..j]
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::AnyRun => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            Token::AnyOne => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j];
                }
            }
            Token::Literal(c) => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j] && text[j] == c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value(field: SearchField) -> &'static str {
        match field {
            SearchField::Id => "12",
            SearchField::InvoiceNumber => "NF-001",
            SearchField::ManagementAccount => "3.1.02",
            SearchField::Supplier => "acme",
            SearchField::Branch => "centro",
            SearchField::InvoiceSeries => "A1",
            SearchField::PaymentMethod => "boleto",
            SearchField::ItemCount => "3",
            SearchField::PostingDate => "2024-05",
        }
    }

    #[test]
    fn test_empty_criteria_builds_empty_predicate() {
        let predicate = build_filter(&SearchCriteria::default());
        assert!(predicate.is_empty());
        assert_eq!(predicate.where_sql(), "");
        assert!(predicate.params().is_empty());
    }

    #[test]
    fn test_blank_fields_are_ignored() {
        let criteria = SearchCriteria::default()
            .with(SearchField::Branch, "   ")
            .with(SearchField::Supplier, "");
        assert!(build_filter(&criteria).is_empty());
    }

    #[test]
    fn test_every_subset_keeps_placeholders_aligned() {
        for mask in 0u32..(1 << SearchField::ALL.len()) {
            let mut criteria = SearchCriteria::default();
            let chosen: Vec<SearchField> = SearchField::ALL
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, f)| *f)
                .collect();
            for field in &chosen {
                criteria.set(*field, sample_value(*field));
            }

            let predicate = build_filter(&criteria);
            let sql = predicate.where_sql();

            assert_eq!(predicate.clauses().len(), chosen.len());
            assert_eq!(predicate.placeholder_count(), predicate.params().len());
            assert_eq!(sql.matches('$').count(), predicate.params().len());

            for (i, (clause, field)) in predicate.clauses().iter().zip(&chosen).enumerate() {
                assert_eq!(clause.placeholders(), &[i + 1]);
                assert!(sql.contains(field.column()));
                let expected = match field.match_kind() {
                    MatchKind::Contains => format!("%{}%", escape_like(sample_value(*field))),
                    MatchKind::Prefix => format!("{}%", escape_like(sample_value(*field))),
                };
                assert_eq!(predicate.params()[i], FilterValue::Pattern(expected));
            }
        }
    }

    #[test]
    fn test_values_never_reach_sql_text() {
        let hostile = "x'; DROP TABLE payment_orders; --";
        let criteria = SearchCriteria::default()
            .with(SearchField::Supplier, hostile)
            .with(SearchField::InvoiceNumber, hostile);
        let predicate = build_filter(&criteria);
        let sql = predicate.where_sql();

        assert!(!sql.contains("DROP"));
        assert_eq!(
            sql,
            " WHERE o.invoice_number ILIKE $1 AND o.supplier_name ILIKE $2"
        );
    }

    #[test]
    fn test_prefix_fields_cast_to_text() {
        let criteria = SearchCriteria::default().with(SearchField::Id, "4");
        let predicate = build_filter(&criteria);
        assert_eq!(predicate.where_sql(), " WHERE CAST(o.id AS TEXT) LIKE $1");
        assert_eq!(predicate.params(), &[FilterValue::Pattern("4%".to_string())]);
    }

    #[test]
    fn test_date_range_requires_both_bounds() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(build_date_range_filter(Some(d), None), Err(OrderError::Structural(_))));
        assert!(matches!(build_date_range_filter(None, Some(d)), Err(OrderError::Structural(_))));
        assert!(build_date_range_filter(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(build_date_range_filter(Some(start), Some(end)), Err(OrderError::Structural(_))));
    }

    #[test]
    fn test_date_range_sql() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let predicate = build_date_range_filter(Some(start), Some(end)).unwrap();
        assert_eq!(predicate.where_sql(), " WHERE o.posting_date BETWEEN $1 AND $2");
        assert_eq!(predicate.clauses()[0].placeholders(), &[1, 2]);
        assert_eq!(predicate.params(), &[FilterValue::Date(start), FilterValue::Date(end)]);
    }

    #[test]
    fn test_like_semantics() {
        assert!(like("%acme%", "ACME LTDA", true));
        assert!(!like("%acme%", "ACME LTDA", false));
        assert!(like("12%", "123", false));
        assert!(!like("12%", "312", false));
        assert!(like("a_c", "abc", false));
        assert!(like("100\\%", "100%", false));
        assert!(!like("100\\%", "1000", false));
        assert!(like("%", "", false));
    }

    #[test]
    fn test_escaped_input_matches_literally() {
        let pattern = format!("%{}%", escape_like("50%_off"));
        assert!(like(&pattern, "promo 50%_off now", true));
        assert!(!like(&pattern, "promo 50 xoff now", true));
    }

    #[test]
    fn test_criteria_deserialize_sparse() {
        let criteria: SearchCriteria =
            serde_json::from_str(r#"{"supplier": "acme", "item_count": "2"}"#).unwrap();
        assert_eq!(criteria.get(SearchField::Supplier), Some("acme"));
        assert_eq!(criteria.get(SearchField::ItemCount), Some("2"));
        assert_eq!(criteria.get(SearchField::Branch), None);
    }
}
