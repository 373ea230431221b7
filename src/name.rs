//! Name registry (spec.md §4.B): interns package *names*, string -> [`Name`],
//! holding every [`Package`](crate::package::Package) variant known to the
//! system regardless of install state.

use crate::arena::Id;
use crate::package::Package;
use crate::store::Store;

/// A unique package name. Lifetime: interned on first sight, destroyed only
/// at database teardown.
#[derive(Debug)]
pub struct Name {
    pub name: String,
    pub pkgs: Vec<Id<Package>>,
}

impl Store {
    /// `get_name`: inserts on miss.
    pub fn get_name(&mut self, name: &str) -> Id<Name> {
        if let Some(id) = self.names.get_by_key(&name.to_owned()) {
            return id;
        }

        self.names.insert(
            name.to_owned(),
            Name {
                name: name.to_owned(),
                pkgs: Vec::new(),
            },
        )
    }

    pub fn name(&self, id: Id<Name>) -> &Name {
        self.names.get(id)
    }

    pub fn name_mut(&mut self, id: Id<Name>) -> &mut Name {
        self.names.get_mut(id)
    }
}

#[cfg(test)]
mod test {
    use crate::store::Store;

    #[test]
    fn get_name_interns_once() {
        let mut store = Store::new();
        let a = store.get_name("busybox");
        let b = store.get_name("busybox");
        assert_eq!(a, b);
        assert_eq!(store.name(a).name, "busybox");
    }
}
