/// The four logical sub-volumes making up one deployed template dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subvolume {
    Rootfs,
    Home,
    Opt,
    Var,
}

impl Subvolume {
    pub const ALL: [Subvolume; 4] = [
        Subvolume::Rootfs,
        Subvolume::Home,
        Subvolume::Opt,
        Subvolume::Var,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subvolume::Rootfs => "rootfs",
            Subvolume::Home => "home",
            Subvolume::Opt => "opt",
            Subvolume::Var => "var",
        }
    }

    pub fn delta_file(&self) -> String {
        format!("{}.delta", self.as_str())
    }
}

impl std::fmt::Display for Subvolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
