use super::{Param, Subscription, TypeRef};
use crate::error::{HandlerError, ValidationError};

const SIGNATURE: &str = "Fn([Context,] T) -> Result<(), HandlerError>";

/// Rejects subscriptions whose handlers do not match the canonical shape.
///
/// ### Rules
/// - at least one handler;
/// - parameters exactly `[T]` or `[Context, T]`;
/// - `T` is a public type or a standard-library/primitive type;
/// - exactly one result, [`HandlerError`].
pub(crate) fn validate(sub: &Subscription) -> Result<(), ValidationError> {
    if sub.handlers().is_empty() {
        return Err(ValidationError::NoHandlers {
            topic: sub.topic().to_string(),
        });
    }

    let error_ty = TypeRef::of::<HandlerError>();
    for handler in sub.handlers() {
        let sig = handler.signature();
        let name = sig.handler_name();

        let payload = match sig.params.as_slice() {
            [Param::Payload(ty)] | [Param::Context, Param::Payload(ty)] => ty,
            _ => {
                return Err(ValidationError::Arguments {
                    handler: name,
                    got: sig.describe_params(),
                    expected: SIGNATURE,
                });
            }
        };

        if !payload.is_exported() && !payload.is_builtin() {
            return Err(ValidationError::NotExported {
                handler: name,
                ty: payload.to_string(),
            });
        }

        match sig.results.as_slice() {
            [ty] if *ty == error_ty => {}
            [ty] => {
                return Err(ValidationError::NotError {
                    handler: name,
                    ty: ty.to_string(),
                });
            }
            results => {
                return Err(ValidationError::Results {
                    handler: name,
                    got: results.len(),
                    expected: SIGNATURE,
                });
            }
        }
    }
    Ok(())
}
