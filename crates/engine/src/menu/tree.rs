//! Pure menu-forest construction over a flat resource list.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use iamsync_auth::{Permission, Resource};
use iamsync_core::ResourceId;

/// Screen-type → screen-key bindings, per resource key.
pub type ScreenMap = HashMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub key: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub scope: String,
    pub sort_order: i32,
    /// Permissions whose resource segment is exactly this key; `None` for an unfiltered menu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screens: Option<BTreeMap<String, String>>,
    pub children: Vec<MenuNode>,
}

/// Visibility and parent→children index computed once for a resource list.
///
/// Built in two steps so callers can fetch screen bindings only for the
/// resources that end up visible.
pub struct MenuPlan<'a> {
    visible: Vec<&'a Resource>,
    roots: Vec<&'a Resource>,
    children: HashMap<ResourceId, Vec<&'a Resource>>,
    permissions_by_key: Option<HashMap<&'a str, Vec<String>>>,
}

impl<'a> MenuPlan<'a> {
    /// `permissions == None` shows every resource.
    pub fn new(resources: &'a [Resource], permissions: Option<&'a BTreeSet<Permission>>) -> Self {
        let visible_ids: HashSet<ResourceId> = match permissions {
            None => resources.iter().map(|r| r.id).collect(),
            Some(perms) => upward_closure(resources, perms),
        };

        let permissions_by_key = permissions.map(|perms| {
            let mut by_key: HashMap<&'a str, Vec<String>> = HashMap::new();
            for p in perms {
                if let Some((key, _)) = p.split() {
                    by_key.entry(key).or_default().push(p.as_str().to_string());
                }
            }
            by_key
        });

        let visible: Vec<&Resource> = resources.iter().filter(|r| visible_ids.contains(&r.id)).collect();

        let mut roots = Vec::new();
        let mut children: HashMap<ResourceId, Vec<&Resource>> = HashMap::new();
        for r in &visible {
            match r.parent_id.filter(|p| visible_ids.contains(p)) {
                Some(parent) => children.entry(parent).or_default().push(*r),
                None => roots.push(*r),
            }
        }

        Self {
            visible,
            roots,
            children,
            permissions_by_key,
        }
    }

    /// Keys of visible resources, in input order.
    pub fn visible_keys(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.visible.iter().map(|r| r.key.as_str())
    }

    pub fn build(&self, screens: &ScreenMap) -> Vec<MenuNode> {
        self.roots.iter().map(|r| self.node(r, screens)).collect()
    }

    fn node(&self, resource: &Resource, screens: &ScreenMap) -> MenuNode {
        let children = self
            .children
            .get(&resource.id)
            .map(|kids| kids.iter().map(|k| self.node(k, screens)).collect())
            .unwrap_or_default();

        MenuNode {
            key: resource.key.clone(),
            display_name: resource.display_name.clone(),
            icon: resource.icon.clone(),
            scope: resource.scope.clone(),
            sort_order: resource.sort_order,
            permissions: self
                .permissions_by_key
                .as_ref()
                .map(|by_key| by_key.get(resource.key.as_str()).cloned().unwrap_or_default()),
            screens: screens.get(&resource.key).filter(|m| !m.is_empty()).cloned(),
            children,
        }
    }
}

/// Resources named by a permission, plus all of their ancestors.
fn upward_closure(resources: &[Resource], permissions: &BTreeSet<Permission>) -> HashSet<ResourceId> {
    let by_id: HashMap<ResourceId, &Resource> = resources.iter().map(|r| (r.id, r)).collect();
    let by_key: HashMap<&str, &Resource> = resources.iter().map(|r| (r.key.as_str(), r)).collect();

    let mut visible = HashSet::new();
    for key in permissions.iter().filter_map(|p| p.resource_key()) {
        let mut cursor = by_key.get(key).copied();
        while let Some(r) = cursor {
            // stops on revisits, which also bounds a malformed cyclic parent chain
            if !visible.insert(r.id) {
                break;
            }
            cursor = r.parent_id.and_then(|p| by_id.get(&p).copied());
        }
    }
    visible
}

/// Build the menu forest in one call.
pub fn build_menu(
    resources: &[Resource],
    permissions: Option<&BTreeSet<Permission>>,
    screens: &ScreenMap,
) -> Vec<MenuNode> {
    MenuPlan::new(resources, permissions).build(screens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn perms(names: &[&str]) -> BTreeSet<Permission> {
        names.iter().map(|n| Permission::new(n.to_string())).collect()
    }

    /// academics > grades > transcripts, academics > attendance, admin > users
    fn school_resources() -> Vec<Resource> {
        let academics = Resource::new("academics", "Academics", 1).with_icon("book");
        let grades = Resource::new("grades", "Grades", 1).with_parent(&academics);
        let transcripts = Resource::new("transcripts", "Transcripts", 1).with_parent(&grades);
        let attendance = Resource::new("attendance", "Attendance", 2).with_parent(&academics);
        let admin = Resource::new("admin", "Administration", 2);
        let users = Resource::new("users", "Users", 1).with_parent(&admin);
        vec![academics, grades, transcripts, attendance, admin, users]
    }

    fn keys(nodes: &[MenuNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.key.as_str()).collect()
    }

    #[test]
    fn leaf_permission_pulls_in_ancestors_only() {
        let resources = school_resources();
        let p = perms(&["grades:read"]);
        let menu = build_menu(&resources, Some(&p), &ScreenMap::new());

        assert_eq!(keys(&menu), vec!["academics"]);
        assert_eq!(keys(&menu[0].children), vec!["grades"]);
        // visibility never flows down
        assert!(menu[0].children[0].children.is_empty());
        assert_eq!(menu[0].permissions, Some(vec![]));
        assert_eq!(menu[0].children[0].permissions, Some(vec!["grades:read".to_string()]));
    }

    #[test]
    fn empty_permission_set_yields_empty_forest() {
        let resources = school_resources();
        let menu = build_menu(&resources, Some(&BTreeSet::new()), &ScreenMap::new());
        assert!(menu.is_empty());
    }

    #[test]
    fn malformed_and_unknown_permissions_are_ignored() {
        let resources = school_resources();
        let p = perms(&["grades", ":read", "ghost:read", "users:"]);
        assert!(build_menu(&resources, Some(&p), &ScreenMap::new()).is_empty());
    }

    #[test]
    fn unfiltered_menu_contains_everything_in_order() {
        let resources = school_resources();
        let menu = build_menu(&resources, None, &ScreenMap::new());
        assert_eq!(keys(&menu), vec!["academics", "admin"]);
        assert_eq!(keys(&menu[0].children), vec!["grades", "attendance"]);
        assert_eq!(keys(&menu[0].children[0].children), vec!["transcripts"]);
        assert!(menu.iter().all(|n| n.permissions.is_none()));
    }

    #[test]
    fn orphan_with_missing_parent_becomes_root() {
        let ghost = Resource::new("ghost", "Ghost", 0);
        let orphan = Resource::new("reports", "Reports", 3).with_parent(&ghost);
        let resources = vec![orphan];
        let p = perms(&["reports:read"]);
        let menu = build_menu(&resources, Some(&p), &ScreenMap::new());
        assert_eq!(keys(&menu), vec!["reports"]);
    }

    #[test]
    fn cyclic_parents_terminate() {
        let mut a = Resource::new("a", "A", 0);
        let mut b = Resource::new("b", "B", 0);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let resources = vec![a, b];
        let p = perms(&["a:read"]);
        // both visible but neither has an invisible parent, so nothing roots
        assert!(build_menu(&resources, Some(&p), &ScreenMap::new()).is_empty());
    }

    #[test]
    fn screens_attach_and_empty_maps_are_omitted() {
        let resources = school_resources();
        let mut screens = ScreenMap::new();
        screens.insert(
            "grades".to_string(),
            BTreeMap::from([("list".to_string(), "grades.list".to_string())]),
        );
        screens.insert("academics".to_string(), BTreeMap::new());

        let menu = build_menu(&resources, None, &screens);
        assert!(menu[0].screens.is_none());
        assert_eq!(
            menu[0].children[0].screens.as_ref().and_then(|s| s.get("list")).map(String::as_str),
            Some("grades.list")
        );

        let json = serde_json::to_value(&menu[0]).unwrap();
        assert!(json.get("screens").is_none());
        assert!(json.get("permissions").is_none());
        assert_eq!(json["children"][0]["children"][0]["children"], serde_json::json!([]));
    }

    #[test]
    fn plan_reports_visible_keys() {
        let resources = school_resources();
        let p = perms(&["users:read"]);
        let plan = MenuPlan::new(&resources, Some(&p));
        assert_eq!(plan.visible_keys().collect::<Vec<_>>(), vec!["admin", "users"]);
    }

    // ── properties ──────────────────────────────────────────────────────────

    /// Random forest: each resource may point at any earlier one.
    fn arb_forest() -> impl Strategy<Value = Vec<Resource>> {
        prop::collection::vec(prop::option::of(any::<prop::sample::Index>()), 1..24).prop_map(|parents| {
            let mut out: Vec<Resource> = Vec::with_capacity(parents.len());
            for (i, parent) in parents.into_iter().enumerate() {
                let mut r = Resource::new(format!("r{i}"), format!("R{i}"), i as i32);
                if i > 0 {
                    if let Some(idx) = parent {
                        r.parent_id = Some(out[idx.index(i)].id);
                    }
                }
                out.push(r);
            }
            out
        })
    }

    fn collect<'n>(nodes: &'n [MenuNode], out: &mut Vec<&'n MenuNode>) {
        for n in nodes {
            out.push(n);
            collect(&n.children, out);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn visible_set_is_upward_closed(
            resources in arb_forest(),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
            actions in prop::collection::vec("(read|write)", 6),
        ) {
            let p: BTreeSet<Permission> = picks
                .iter()
                .zip(actions.iter())
                .map(|(i, a)| Permission::new(format!("{}:{a}", resources[i.index(resources.len())].key)))
                .collect();
            let menu = build_menu(&resources, Some(&p), &ScreenMap::new());

            let mut nodes = Vec::new();
            collect(&menu, &mut nodes);
            let shown: HashSet<&str> = nodes.iter().map(|n| n.key.as_str()).collect();
            let by_id: HashMap<ResourceId, &Resource> = resources.iter().map(|r| (r.id, r)).collect();

            // every permitted resource and each of its ancestors is present
            for perm in &p {
                let mut cur = resources.iter().find(|r| Some(r.key.as_str()) == perm.resource_key());
                while let Some(r) = cur {
                    prop_assert!(shown.contains(r.key.as_str()));
                    cur = r.parent_id.and_then(|id| by_id.get(&id).copied());
                }
            }

            // node permissions are exact and no key repeats
            for n in &nodes {
                let own: Vec<String> = p
                    .iter()
                    .filter(|perm| perm.resource_key() == Some(n.key.as_str()))
                    .map(|perm| perm.as_str().to_string())
                    .collect();
                prop_assert_eq!(n.permissions.clone(), Some(own));
            }
            prop_assert_eq!(nodes.len(), shown.len());
        }

        #[test]
        fn unfiltered_menu_has_every_resource_once(resources in arb_forest()) {
            let menu = build_menu(&resources, None, &ScreenMap::new());
            let mut nodes = Vec::new();
            collect(&menu, &mut nodes);
            prop_assert_eq!(nodes.len(), resources.len());
            let shown: HashSet<&str> = nodes.iter().map(|n| n.key.as_str()).collect();
            prop_assert_eq!(shown.len(), resources.len());
        }
    }
}
