use std::sync::Arc;

use dashmap::DashMap;

use crate::constant_info::MemberRef;

use super::descriptor::MethodDescriptor;

/// Method signature cache shared by every worker of a decompilation run.
///
/// Lookups are insert-if-absent. Two workers racing on the same key may both
/// parse the descriptor; the results are identical so either one may win.
#[derive(Debug, Default)]
pub struct ClasspathHelper {
    methods: DashMap<MemberRef, Arc<MethodDescriptor>>,
}

impl ClasspathHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed descriptor of `member`, or `None` when the descriptor is
    /// malformed (malformed descriptors are not cached).
    pub fn find_method(&self, member: &MemberRef) -> Option<Arc<MethodDescriptor>> {
        if let Some(found) = self.methods.get(member) {
            return Some(Arc::clone(found.value()));
        }
        let parsed = Arc::new(MethodDescriptor::parse(&member.descriptor)?);
        let entry = self.methods.entry(member.clone()).or_insert(parsed);
        Some(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn member(name: &str) -> MemberRef {
        MemberRef {
            class_name: "java/lang/StringBuilder".into(),
            name: name.into(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/StringBuilder;".into(),
            is_interface: false,
        }
    }

    #[test]
    fn concurrent_lookups_share_one_entry() {
        let helper = Arc::new(ClasspathHelper::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let helper = Arc::clone(&helper);
                thread::spawn(move || helper.find_method(&member("append")).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(helper.len(), 1);
        assert!(results.iter().all(|d| d.params.len() == 1));
    }

    #[test]
    fn malformed_descriptor_is_not_cached() {
        let helper = ClasspathHelper::new();
        let mut bad = member("append");
        bad.descriptor = "(Lbroken".into();
        assert!(helper.find_method(&bad).is_none());
        assert!(helper.is_empty());
    }
}
