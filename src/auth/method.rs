use std::fmt;

use http::Method;

/// CRUD action derived from an HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudAction {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudAction::Create => "create",
            CrudAction::Read => "read",
            CrudAction::Update => "update",
            CrudAction::Delete => "delete",
        }
    }
}

impl fmt::Display for CrudAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METHOD_ACTIONS: [(Method, CrudAction); 5] = [
    (Method::POST, CrudAction::Create),
    (Method::PUT, CrudAction::Update),
    (Method::PATCH, CrudAction::Update),
    (Method::GET, CrudAction::Read),
    (Method::DELETE, CrudAction::Delete),
];

/// Action for `method`; methods outside the CRUD verbs have none
pub fn action_for_method(method: &Method) -> Option<CrudAction> {
    METHOD_ACTIONS
        .iter()
        .find(|(candidate, _)| candidate == method)
        .map(|(_, action)| *action)
}
