use uuid::Uuid;

use campus_types::api::Claims;
use campus_types::models::Role;

use crate::error::ApiError;

/// Record families with an ownership-based visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Grades,
    Diplomas,
}

/// Whether `caller_id` acting as `role` may read records of `resource`
/// owned by `owner_id`. Owners always may; grades are also open to teachers
/// and admins, diplomas only to admins.
pub fn can_view(resource: Resource, role: Role, owner_id: Uuid, caller_id: Uuid) -> bool {
    owner_id == caller_id || sees_all(resource, role)
}

fn sees_all(resource: Resource, role: Role) -> bool {
    match resource {
        Resource::Grades => matches!(role, Role::Teacher | Role::Admin),
        Resource::Diplomas => role.is_admin(),
    }
}

/// Listing scope for the caller: `None` means every owner, `Some(id)` only
/// the caller's own records.
pub fn listing_scope(resource: Resource, claims: &Claims) -> Option<Uuid> {
    if sees_all(resource, claims.role) {
        None
    } else {
        Some(claims.sub)
    }
}

/// Role gate for grade, diploma and user mutations.
pub fn ensure_admin(claims: &Claims) -> Result<(), ApiError> {
    if claims.role.is_admin() {
        Ok(())
    } else {
        Err(ApiError::AccessDenied(format!(
            "{} role cannot perform this action",
            claims.role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            username: "u".into(),
            display_name: "U".into(),
            role,
            exp: 0,
        }
    }

    #[test]
    fn owners_always_see_their_records() {
        let me = Uuid::new_v4();
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert!(can_view(Resource::Grades, role, me, me));
            assert!(can_view(Resource::Diplomas, role, me, me));
        }
    }

    #[test]
    fn grades_visible_to_staff_diplomas_to_admins() {
        let owner = Uuid::new_v4();
        let caller = Uuid::new_v4();

        assert!(!can_view(Resource::Grades, Role::Student, owner, caller));
        assert!(can_view(Resource::Grades, Role::Teacher, owner, caller));
        assert!(can_view(Resource::Grades, Role::Admin, owner, caller));

        assert!(!can_view(Resource::Diplomas, Role::Student, owner, caller));
        assert!(!can_view(Resource::Diplomas, Role::Teacher, owner, caller));
        assert!(can_view(Resource::Diplomas, Role::Admin, owner, caller));
    }

    #[test]
    fn listing_scope_matches_predicate() {
        let student = claims(Role::Student);
        assert_eq!(listing_scope(Resource::Grades, &student), Some(student.sub));

        let teacher = claims(Role::Teacher);
        assert_eq!(listing_scope(Resource::Grades, &teacher), None);
        assert_eq!(listing_scope(Resource::Diplomas, &teacher), Some(teacher.sub));

        let admin = claims(Role::Admin);
        assert_eq!(listing_scope(Resource::Diplomas, &admin), None);
    }

    #[test]
    fn only_admins_pass_the_gate() {
        assert!(ensure_admin(&claims(Role::Admin)).is_ok());
        assert!(matches!(
            ensure_admin(&claims(Role::Teacher)),
            Err(ApiError::AccessDenied(_))
        ));
        assert!(ensure_admin(&claims(Role::Student)).is_err());
    }
}
