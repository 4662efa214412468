use crate::model::common::ChoiceId;

/// A submitted vote form. The choice is optional: a form posted without
/// selecting anything, or with a value that is not a valid ID, arrives as `None`.
#[derive(Debug, Default, FromForm)]
pub struct VoteForm {
    pub choice: Option<ChoiceId>,
}
