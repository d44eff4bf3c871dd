use serde::Serialize;
use std::fmt;

/// Where a digest goes. Ids are OneBot numeric ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotDestination {
    Group(i64),
    PrivateUser(i64),
}

impl BotDestination {
    pub fn action(&self) -> ActionName {
        match self {
            BotDestination::Group(_) => ActionName::SendGroupMsg,
            BotDestination::PrivateUser(_) => ActionName::SendPrivateMsg,
        }
    }

    /// Wrap `text` into the message this destination expects.
    pub fn envelope(&self, text: &str) -> DispatchEnvelope {
        let params = match *self {
            BotDestination::Group(group_id) => MessageParams::Group {
                group_id,
                message: text.to_string(),
            },
            BotDestination::PrivateUser(user_id) => MessageParams::Private {
                user_id,
                message: text.to_string(),
            },
        };
        DispatchEnvelope {
            action: self.action(),
            params,
        }
    }
}

impl fmt::Display for BotDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotDestination::Group(id) => write!(f, "group:{id}"),
            BotDestination::PrivateUser(id) => write!(f, "user:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    SendGroupMsg,
    SendPrivateMsg,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::SendGroupMsg => "send_group_msg",
            ActionName::SendPrivateMsg => "send_private_msg",
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageParams {
    Group { group_id: i64, message: String },
    Private { user_id: i64, message: String },
}

/// `{action, params}` as posted to a unified endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchEnvelope {
    pub action: ActionName,
    pub params: MessageParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_envelope_shape() {
        let env = BotDestination::Group(123).envelope("hi");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "action": "send_group_msg", "params": { "group_id": 123, "message": "hi" } })
        );
    }

    #[test]
    fn private_params_carry_user_id_only() {
        let env = BotDestination::PrivateUser(9).envelope("yo");
        assert_eq!(env.action.as_str(), "send_private_msg");
        assert_eq!(
            serde_json::to_value(&env.params).unwrap(),
            json!({ "user_id": 9, "message": "yo" })
        );
    }
}
