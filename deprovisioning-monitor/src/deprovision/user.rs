/*!
Deprovisioning candidates discovered during a single run
*/

use crate::deprovision::identity::{
    Entity, EntityId, EntityOperation, EntityState, PERSISTENT_IDENTITY_TYPE,
};

/// An account selected for deprovisioning. Lives for one run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Identifier assigned by the identity system
    pub internal_id: EntityId,
    /// Federated identifier from the first persistent identity, if any
    pub shared_id: Option<String>,
}

impl User {
    pub fn new(internal_id: EntityId) -> Self {
        Self { internal_id, shared_id: None }
    }

    /// Build a candidate from an entity that is disabled and not already
    /// on its way out. Returns `None` for every other entity.
    pub fn from_entity(internal_id: EntityId, entity: &Entity) -> Option<Self> {
        let info = &entity.entity_information;
        if info.state != EntityState::Disabled {
            return None;
        }
        if info.scheduled_operation == Some(EntityOperation::Remove) {
            return None;
        }

        let mut user = Self::new(internal_id);
        user.shared_id = entity
            .identities
            .iter()
            .find(|identity| identity.type_id == PERSISTENT_IDENTITY_TYPE)
            .map(|identity| identity.value.clone());
        Some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deprovision::identity::{EntityInformation, Identity};

    fn entity(
        state: EntityState,
        scheduled_operation: Option<EntityOperation>,
        identities: &[(&str, &str)],
    ) -> Entity {
        Entity {
            entity_information: EntityInformation { state, scheduled_operation },
            identities: identities
                .iter()
                .map(|(type_id, value)| Identity {
                    type_id: type_id.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn only_disabled_entities_are_candidates() {
        for state in [
            EntityState::Valid,
            EntityState::AuthenticationDisabled,
            EntityState::OnlyLoginPermitted,
            EntityState::Unknown,
        ] {
            assert_eq!(User::from_entity(1, &entity(state, None, &[])), None);
        }
        assert_eq!(
            User::from_entity(1, &entity(EntityState::Disabled, None, &[])),
            Some(User::new(1))
        );
    }

    #[test]
    fn entities_already_scheduled_for_removal_are_skipped() {
        let scheduled = entity(EntityState::Disabled, Some(EntityOperation::Remove), &[]);
        assert_eq!(User::from_entity(1, &scheduled), None);

        let other_op = entity(EntityState::Disabled, Some(EntityOperation::Disable), &[]);
        assert_eq!(User::from_entity(1, &other_op), Some(User::new(1)));
    }

    #[test]
    fn first_persistent_identity_wins() {
        let entity = entity(
            EntityState::Disabled,
            None,
            &[
                ("userName", "jdoe"),
                ("persistent", "urn:first"),
                ("persistent", "urn:second"),
            ],
        );

        let user = User::from_entity(5, &entity).unwrap();
        assert_eq!(user.internal_id, 5);
        assert_eq!(user.shared_id.as_deref(), Some("urn:first"));
    }

    #[test]
    fn shared_id_stays_unset_without_persistent_identity() {
        let entity = entity(EntityState::Disabled, None, &[("email", "jdoe@example.org")]);
        assert_eq!(User::from_entity(5, &entity).unwrap().shared_id, None);
    }
}
