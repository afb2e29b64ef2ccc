//! Value formatter chain used when rendering values in messages.
//!
//! A context holds the head of a chain of formatters. Each factory added with
//! [`TestExecutionContext::add_formatter`](super::TestExecutionContext::add_formatter)
//! receives the current head and returns a new one, typically handling a few
//! types itself and delegating everything else to the formatter it wrapped.

use std::any::Any;
use std::sync::Arc;

use crate::localization;

/// Renders a value for display in a message.
pub type ValueFormatter = Arc<dyn Fn(&dyn Any) -> String + Send + Sync>;

/// Builds a new chain head from the current one.
pub type ValueFormatterFactory = Box<dyn FnOnce(ValueFormatter) -> ValueFormatter + Send>;

/// Formatter at the end of every chain.
#[must_use]
pub fn default_formatter() -> ValueFormatter {
    Arc::new(format_default)
}

fn format_default(value: &dyn Any) -> String {
    macro_rules! try_format {
        ($($ty:ty),* $(,)?) => {
            $(
                if let Some(val) = value.downcast_ref::<$ty>() {
                    return format!("{val:?}");
                }
            )*
        };
    }

    if value.is::<()>() {
        return localization::message("value-format-null");
    }
    try_format!(
        &str, String, char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128,
        usize, f32, f64,
    );
    localization::message_with_args("value-format-opaque", |args| {
        args.set("type_name", format!("{:?}", value.type_id()));
    })
}

#[cfg(test)]
mod tests {
    use super::{ValueFormatter, default_formatter};
    use crate::localization::strip_directional_isolates;
    use std::any::Any;
    use std::sync::Arc;

    #[test]
    fn primitives_use_debug_formatting() {
        let format = default_formatter();
        assert_eq!(format(&42_i32), "42");
        assert_eq!(format(&"hi"), "\"hi\"");
        assert_eq!(format(&String::from("x")), "\"x\"");
        assert_eq!(format(&()), "null");
    }

    #[test]
    fn unknown_types_render_opaquely() {
        struct Widget;
        let rendered = strip_directional_isolates(&default_formatter()(&Widget));
        assert!(rendered.starts_with("<TypeId"));
        assert!(rendered.ends_with('>'));
    }

    #[test]
    fn chained_formatters_delegate() {
        let base = default_formatter();
        let chained: ValueFormatter = Arc::new(move |value: &dyn Any| {
            value
                .downcast_ref::<bool>()
                .map_or_else(|| base(value), |flag| if *flag { "yes" } else { "no" }.to_owned())
        });
        assert_eq!(chained(&true), "yes");
        assert_eq!(chained(&5_u8), "5");
    }
}
