use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub name: String,
    pub bg: String,
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub text_primary: String,
    pub text_secondary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSpec {
    pub name: String,
    pub family: String,
}

impl FontSpec {
    pub fn import_url(&self) -> String {
        format!(
            "https://fonts.googleapis.com/css2?family={}&display=swap",
            self.name.replace(' ', "+")
        )
    }
}

/// Presentation options a project may pick from.
///
/// Lookups by id fall back to the first entry so a record written against an
/// older catalog still opens.
#[derive(Debug, Clone)]
pub struct PresentationCatalog {
    layouts: IndexMap<u32, Layout>,
    schemes: IndexMap<String, ColorScheme>,
    fonts: IndexMap<String, FontSpec>,
}

impl PresentationCatalog {
    pub fn layout(&self, id: u32) -> &Layout {
        self.layouts
            .get(&id)
            .unwrap_or_else(|| first_value(&self.layouts))
    }

    pub fn scheme(&self, name: &str) -> &ColorScheme {
        self.schemes
            .get(name)
            .unwrap_or_else(|| first_value(&self.schemes))
    }

    pub fn font(&self, name: &str) -> &FontSpec {
        self.fonts
            .get(name)
            .unwrap_or_else(|| first_value(&self.fonts))
    }

    pub fn default_layout(&self) -> &Layout {
        first_value(&self.layouts)
    }

    pub fn default_scheme(&self) -> &ColorScheme {
        first_value(&self.schemes)
    }

    pub fn default_font(&self) -> &FontSpec {
        first_value(&self.fonts)
    }

    pub fn schemes(&self) -> impl Iterator<Item = &ColorScheme> {
        self.schemes.values()
    }

    pub fn fonts(&self) -> impl Iterator<Item = &FontSpec> {
        self.fonts.values()
    }
}

impl Default for PresentationCatalog {
    fn default() -> Self {
        Self {
            layouts: default_layouts(),
            schemes: default_schemes(),
            fonts: default_fonts(),
        }
    }
}

fn first_value<K, V>(map: &IndexMap<K, V>) -> &V {
    // Every catalog map is built non-empty below.
    &map[0]
}

fn default_layouts() -> IndexMap<u32, Layout> {
    let mut map = IndexMap::new();
    map.insert(
        1,
        Layout {
            id: 1,
            name: "Meme Star".to_string(),
        },
    );
    map
}

fn default_schemes() -> IndexMap<String, ColorScheme> {
    let mut map = IndexMap::new();
    let mut insert = |name: &str, classes: [&str; 6]| {
        map.insert(
            name.to_string(),
            ColorScheme {
                name: name.to_string(),
                bg: classes[0].to_string(),
                primary: classes[1].to_string(),
                secondary: classes[2].to_string(),
                accent: classes[3].to_string(),
                text_primary: classes[4].to_string(),
                text_secondary: classes[5].to_string(),
            },
        );
    };

    insert(
        "Meme Pink",
        [
            "bg-[#f000ff]",
            "bg-[#f000ff]",
            "bg-[#d900e6]",
            "text-white",
            "text-white",
            "text-white",
        ],
    );
    insert(
        "Cyberpunk",
        [
            "bg-gray-900",
            "bg-indigo-900",
            "bg-gray-800",
            "text-cyan-400",
            "text-white",
            "text-gray-400",
        ],
    );
    insert(
        "Solar",
        [
            "bg-slate-800",
            "bg-amber-600",
            "bg-slate-700",
            "text-amber-300",
            "text-white",
            "text-slate-300",
        ],
    );
    insert(
        "Aquatic",
        [
            "bg-sky-900",
            "bg-teal-500",
            "bg-sky-800",
            "text-emerald-300",
            "text-white",
            "text-sky-200",
        ],
    );
    map
}

fn default_fonts() -> IndexMap<String, FontSpec> {
    [
        ("Chewy", "'Chewy', cursive"),
        ("Bangers", "'Bangers', cursive"),
        ("Luckiest Guy", "'Luckiest Guy', cursive"),
        ("Titan One", "'Titan One', cursive"),
        ("Permanent Marker", "'Permanent Marker', cursive"),
        ("Comic Neue", "'Comic Neue', cursive"),
        ("VT323", "'VT323', monospace"),
        ("Fredoka One", "'Fredoka One', cursive"),
        ("Roboto", "'Roboto', sans-serif"),
    ]
    .into_iter()
    .map(|(name, family)| {
        (
            name.to_string(),
            FontSpec {
                name: name.to_string(),
                family: family.to_string(),
            },
        )
    })
    .collect()
}
