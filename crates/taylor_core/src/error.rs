use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaylorError>;

/// Every way a single build can fail.
///
/// At the worker boundary each variant is flattened to its `Display` text and
/// delivered as one `error` message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaylorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Differentiation error: {0}")]
    Differentiation(String),
    #[error("Evaluation error{}: {message}", order_suffix(.order))]
    Evaluation {
        /// Derivative order being evaluated, when the failure happened while
        /// building coefficients.
        order: Option<usize>,
        message: String,
    },
    #[error("Unsupported value type: {kind}")]
    UnsupportedType { kind: String },
    #[error("Complex value: {re}+{im}i")]
    NonRealResult { re: f64, im: f64 },
    #[error("Build cancelled")]
    Cancelled,
}

impl TaylorError {
    pub(crate) fn evaluation(order: Option<usize>, message: impl Into<String>) -> Self {
        TaylorError::Evaluation {
            order,
            message: message.into(),
        }
    }

    /// Attach a derivative order to evaluation and coercion failures.
    pub(crate) fn at_order(self, k: usize) -> Self {
        match self {
            TaylorError::Evaluation { message, .. } => TaylorError::Evaluation {
                order: Some(k),
                message,
            },
            TaylorError::UnsupportedType { .. } | TaylorError::NonRealResult { .. } => {
                TaylorError::Evaluation {
                    order: Some(k),
                    message: self.to_string(),
                }
            }
            other => other,
        }
    }
}

fn order_suffix(order: &Option<usize>) -> String {
    match order {
        Some(k) => format!(" at derivative order {k}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::TaylorError;

    #[test]
    fn evaluation_message_mentions_order() {
        let err = TaylorError::evaluation(Some(3), "value is not finite");
        assert_eq!(
            err.to_string(),
            "Evaluation error at derivative order 3: value is not finite"
        );
        let err = TaylorError::evaluation(None, "boom");
        assert_eq!(err.to_string(), "Evaluation error: boom");
    }

    #[test]
    fn coercion_failures_become_tagged_evaluation_errors() {
        let err = TaylorError::NonRealResult { re: 0.0, im: 1.0 }.at_order(2);
        match err {
            TaylorError::Evaluation { order, message } => {
                assert_eq!(order, Some(2));
                assert!(message.contains("Complex value"), "unexpected: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(TaylorError::Cancelled.at_order(1), TaylorError::Cancelled);
    }
}
