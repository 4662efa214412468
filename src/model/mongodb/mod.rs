mod collection;
mod counter;

pub use collection::{ensure_indexes_exist, id_filter, Coll, MongoCollection};
pub use counter::{ensure_counters_exist, Counter, CHOICE_ID_COUNTER, QUESTION_ID_COUNTER};
