//! SOQL query assembly.
//!
//! ```
//! use sfrail::query::Query;
//!
//! let soql = Query::new()
//!     .select(["Id", "Name"])
//!     .from("Account")
//!     .where_("CreatedDate = LAST_N_DAYS:30")
//!     .order_by("Name")
//!     .limit(5)
//!     .build()
//!     .unwrap();
//! assert_eq!(
//!     soql,
//!     "SELECT Id, Name FROM Account WHERE CreatedDate = LAST_N_DAYS:30 ORDER BY Name ASC LIMIT 5"
//! );
//! ```

use crate::error::{Error, Result};

const DEFAULT_FIELD: &str = "Id";
const DEFAULT_DIRECTION: &str = "ASC";

/// Accumulates clauses and renders them in SOQL order. Fragments are passed
/// through verbatim; nothing here checks that they are valid SOQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    fields: Vec<String>,
    object: Option<String>,
    conditions: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    group_by: Vec<String>,
    having: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selected fields.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn from(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn where_(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Same as [`Query::where_`]; reads better after the first condition.
    pub fn and(self, condition: impl Into<String>) -> Self {
        self.where_(condition)
    }

    pub fn order_by(self, field: impl Into<String>) -> Self {
        self.order_by_with(field, DEFAULT_DIRECTION)
    }

    pub fn order_by_with(mut self, field: impl Into<String>, direction: impl Into<String>) -> Self {
        self.order_by
            .push(format!("{} {}", field.into(), direction.into()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Replaces the grouping fields.
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having.push(condition.into());
        self
    }

    /// Renders `SELECT .. FROM .. [WHERE] [GROUP BY] [HAVING] [ORDER BY] [LIMIT] [OFFSET]`.
    /// Does not touch the builder, so repeated calls give the same string.
    pub fn build(&self) -> Result<String> {
        let object = self
            .object
            .as_deref()
            .ok_or_else(|| Error::configuration("object name is required"))?;

        let fields = if self.fields.is_empty() {
            DEFAULT_FIELD.to_string()
        } else {
            self.fields.join(", ")
        };

        let mut clauses = vec![format!("SELECT {}", fields), format!("FROM {}", object)];
        if !self.conditions.is_empty() {
            clauses.push(format!("WHERE {}", self.conditions.join(" AND ")));
        }
        if !self.group_by.is_empty() {
            clauses.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.having.is_empty() {
            clauses.push(format!("HAVING {}", self.having.join(" AND ")));
        }
        if !self.order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            clauses.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            clauses.push(format!("OFFSET {}", offset));
        }
        Ok(clauses.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_and_from_only() {
        let soql = Query::new()
            .select(vec!["Id", "Name", "Owner.Email"])
            .from("Contact")
            .build()
            .unwrap();
        assert_eq!(soql, "SELECT Id, Name, Owner.Email FROM Contact");
    }

    #[test]
    fn defaults_to_id() {
        let soql = Query::new().from("Opportunity").build().unwrap();
        assert_eq!(soql, "SELECT Id FROM Opportunity");
    }

    #[test]
    fn empty_select_defaults_to_id() {
        let soql = Query::new()
            .select(Vec::<String>::new())
            .from("Lead")
            .build()
            .unwrap();
        assert_eq!(soql, "SELECT Id FROM Lead");
    }

    #[test]
    fn missing_object_is_configuration_error() {
        let result = Query::new().select(["Id"]).build();
        match result {
            Err(Error::Configuration { message }) => {
                assert_eq!(message, "object name is required")
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn build_is_idempotent() {
        let query = Query::new()
            .select(["Id"])
            .from("Case")
            .where_("Status = 'New'")
            .limit(10);
        let first = query.build().unwrap();
        let second = query.build().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn where_then_and_joins_with_and() {
        let soql = Query::new()
            .from("Account")
            .where_("Industry = 'Banking'")
            .and("AnnualRevenue > 1000000")
            .build()
            .unwrap();
        assert_eq!(
            soql,
            "SELECT Id FROM Account WHERE Industry = 'Banking' AND AnnualRevenue > 1000000"
        );
    }

    #[test]
    fn and_without_where_behaves_like_where() {
        let soql = Query::new()
            .from("Account")
            .and("Name != null")
            .build()
            .unwrap();
        assert_eq!(soql, "SELECT Id FROM Account WHERE Name != null");
    }

    #[test]
    fn clause_order_is_fixed() {
        let soql = Query::new()
            .offset(20)
            .limit(10)
            .order_by_with("CreatedDate", "DESC")
            .having("COUNT(Id) > 1")
            .group_by(["StageName"])
            .where_("IsClosed = false")
            .from("Opportunity")
            .select(["StageName", "COUNT(Id)"])
            .build()
            .unwrap();
        assert_eq!(
            soql,
            "SELECT StageName, COUNT(Id) FROM Opportunity WHERE IsClosed = false \
             GROUP BY StageName HAVING COUNT(Id) > 1 ORDER BY CreatedDate DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn select_and_group_by_replace() {
        let soql = Query::new()
            .select(["Name"])
            .select(["Id", "Email"])
            .group_by(["Name"])
            .group_by(["Email"])
            .from("Contact")
            .from("Lead")
            .build()
            .unwrap();
        assert_eq!(soql, "SELECT Id, Email FROM Lead GROUP BY Email");
    }

    #[test]
    fn order_by_entries_are_comma_joined() {
        let soql = Query::new()
            .from("Account")
            .order_by("Name")
            .order_by_with("CreatedDate", "DESC NULLS LAST")
            .build()
            .unwrap();
        assert_eq!(
            soql,
            "SELECT Id FROM Account ORDER BY Name ASC, CreatedDate DESC NULLS LAST"
        );
    }

    #[test]
    fn having_conditions_join_with_and() {
        let soql = Query::new()
            .select(["AccountId", "SUM(Amount)"])
            .from("Opportunity")
            .group_by(["AccountId"])
            .having("SUM(Amount) > 100")
            .having("COUNT(Id) > 2")
            .build()
            .unwrap();
        assert_eq!(
            soql,
            "SELECT AccountId, SUM(Amount) FROM Opportunity GROUP BY AccountId \
             HAVING SUM(Amount) > 100 AND COUNT(Id) > 2"
        );
    }

    #[test]
    fn last_limit_and_offset_win() {
        let soql = Query::new()
            .from("Task")
            .limit(1)
            .limit(50)
            .offset(5)
            .offset(0)
            .build()
            .unwrap();
        assert_eq!(soql, "SELECT Id FROM Task LIMIT 50 OFFSET 0");
    }
}
