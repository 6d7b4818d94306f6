pub mod arrow;
pub mod naming;
pub mod rules;

pub use arrow::{map_to_arrow_type, type_label};
pub use naming::table_name;
pub use rules::{Coercion, Matcher, RuleScope, TargetType, TypeRule, TypeRules, DEFAULT_RULES};
