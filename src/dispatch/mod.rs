//! Request dispatch: path resolution, filter translation and the stack state
//! machine that turns a request into a result value

pub mod context;
pub mod path;
pub mod setter;
pub mod stack;
pub mod translate;

pub use context::{DispatchContext, HrefCodec, ProviderRegistry};
pub use path::{PathResolver, ResolvedPath, Segment};
pub use setter::{ArgumentBinder, PropertySetter};
pub use stack::{DispatchOutcome, DispatchStack, ReturnType, Stack};
pub use translate::{FilterTranslator, Translation};

use crate::core::auth::Caller;
use crate::core::error::RestResult;
use crate::request::RequestView;

/// Dispatch one parsed request on behalf of `caller`
pub async fn dispatch(
    ctx: &DispatchContext,
    view: &RequestView,
    caller: &Caller,
) -> RestResult<DispatchOutcome> {
    DispatchStack::dispatch(ctx, view, caller).await
}
