use crate::models::Case;

const SAMPLE_CASES: [(u32, &str); 3] = [
    (
        101,
        "https://prod-images-static.radiopaedia.org/images/1371188/0a1f5edc85aa58d5780928cb39b08659c1fc4d6d7c7dce2f8db1d63c7c737234_big_gallery.jpeg",
    ),
    (
        102,
        "https://prod-images-static.radiopaedia.org/images/1420387/6f63736ff837ff7c5a736b35aba6ab_big_gallery.jpeg",
    ),
    (
        103,
        "https://prod-images-static.radiopaedia.org/images/8686421/17baee9bfb9018e3d109ec63cb380e_big_gallery.jpeg",
    ),
];

/// Read-only worklist of sample cases, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CaseStore {
    cases: Vec<Case>,
}

impl CaseStore {
    pub fn new(cases: Vec<Case>) -> Self {
        Self { cases }
    }

    pub fn samples() -> Self {
        Self::new(
            SAMPLE_CASES
                .iter()
                .map(|(id, url)| Case {
                    id: *id,
                    image_url: (*url).to_string(),
                })
                .collect(),
        )
    }

    pub fn get(&self, id: u32) -> Option<&Case> {
        self.cases.iter().find(|case| case.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.cases.iter().map(|case| case.id).collect()
    }

    pub fn all(&self) -> &[Case] {
        &self.cases
    }
}

impl Default for CaseStore {
    fn default() -> Self {
        Self::samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_cases() {
        let store = CaseStore::samples();
        assert_eq!(store.ids(), vec![101, 102, 103]);
        assert!(store.get(102).unwrap().image_url.contains("1420387"));
        assert!(store.get(104).is_none());
    }
}
