use crate::db::connection::StoreError;
use crate::model::book::BookField;
use serde_json::Value;

/// Backend-agnostic filter expression tree used to build store queries.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpression {
    Literal(Value),
    Field(BookField),
    BinaryOperator {
        op: BinaryOperator,
        lhs: Box<FilterExpression>,
        rhs: Box<FilterExpression>,
    },
    DocumentKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    In,
}

impl BinaryOperator {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

/// Comparator tag for single-field range lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl From<Comparator> for BinaryOperator {
    fn from(c: Comparator) -> Self {
        match c {
            Comparator::Eq => BinaryOperator::Eq,
            Comparator::Ne => BinaryOperator::Ne,
            Comparator::Gt => BinaryOperator::Gt,
            Comparator::Gte => BinaryOperator::Gte,
            Comparator::Lt => BinaryOperator::Lt,
            Comparator::Lte => BinaryOperator::Lte,
        }
    }
}

/// The value side of a single-field lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldCriterion {
    Equals(Value),
    Compare(Comparator, Value),
}

impl FilterExpression {
    /// Matches every document.
    pub fn all() -> Self {
        FilterExpression::Literal(Value::Bool(true))
    }

    pub fn field(field: BookField) -> Self {
        FilterExpression::Field(field)
    }

    pub fn key_eq(key: impl Into<String>) -> Self {
        FilterExpression::DocumentKey.binary(BinaryOperator::Eq, Value::String(key.into()))
    }

    /// `field <comparator> value`.
    pub fn compare(field: BookField, comparator: Comparator, value: impl Into<Value>) -> Self {
        FilterExpression::Field(field).binary(comparator.into(), value.into())
    }

    pub fn from_criterion(field: BookField, criterion: FieldCriterion) -> Self {
        match criterion {
            FieldCriterion::Equals(v) => Self::compare(field, Comparator::Eq, v),
            FieldCriterion::Compare(c, v) => Self::compare(field, c, v),
        }
    }

    fn binary(self, op: BinaryOperator, value: Value) -> FilterExpression {
        FilterExpression::BinaryOperator {
            op,
            lhs: Box::new(self),
            rhs: Box::new(FilterExpression::Literal(value)),
        }
    }

    pub fn and(self, other: FilterExpression) -> FilterExpression {
        FilterExpression::BinaryOperator {
            op: BinaryOperator::And,
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn or(self, other: FilterExpression) -> FilterExpression {
        FilterExpression::BinaryOperator {
            op: BinaryOperator::Or,
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Ne, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Gt, value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Gte, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Lt, value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> FilterExpression {
        self.binary(BinaryOperator::Lte, value.into())
    }

    pub fn in_(self, values: Vec<Value>) -> FilterExpression {
        self.binary(BinaryOperator::In, Value::Array(values))
    }

    /// Check literal operands against the type of the field they are compared with.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            FilterExpression::Literal(_)
            | FilterExpression::Field(_)
            | FilterExpression::DocumentKey => Ok(()),
            FilterExpression::BinaryOperator { op, lhs, rhs } => {
                if op.is_logical() {
                    lhs.validate()?;
                    return rhs.validate();
                }
                match (&**lhs, &**rhs) {
                    (FilterExpression::Field(field), FilterExpression::Literal(value)) => {
                        if *op == BinaryOperator::In {
                            let items = value.as_array().ok_or_else(|| {
                                StoreError::validation(format!(
                                    "IN on '{}' requires an array operand",
                                    field
                                ))
                            })?;
                            items.iter().try_for_each(|v| field.check_value(v))
                        } else {
                            field.check_value(value)
                        }
                    }
                    (l, r) => {
                        l.validate()?;
                        r.validate()
                    }
                }
            }
        }
    }

    /// Fields referenced anywhere in the expression, in visit order.
    pub fn fields(&self) -> Vec<BookField> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<BookField>) {
        match self {
            FilterExpression::Field(f) => out.push(*f),
            FilterExpression::BinaryOperator { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            FilterExpression::Literal(_) | FilterExpression::DocumentKey => {}
        }
    }

    /// `field == literal` constraints in a top-level conjunction. Used to
    /// pick an index prefix when reporting plans.
    pub fn equality_constraints(&self) -> Vec<(BookField, &Value)> {
        match self {
            FilterExpression::BinaryOperator {
                op: BinaryOperator::And,
                lhs,
                rhs,
            } => {
                let mut out = lhs.equality_constraints();
                out.extend(rhs.equality_constraints());
                out
            }
            FilterExpression::BinaryOperator {
                op: BinaryOperator::Eq,
                lhs,
                rhs,
            } => match (&**lhs, &**rhs) {
                (FilterExpression::Field(f), FilterExpression::Literal(v)) => vec![(*f, v)],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
