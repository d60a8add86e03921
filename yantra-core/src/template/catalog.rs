//! Curated runtime templates seeded at service start. Templates are inert:
//! operators copy one into a compiler definition; nothing here drives a
//! build on its own.

/// One curated template definition.
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub dockerfile_template: &'static str,
    pub default_run_command: &'static [&'static str],
    pub tags: &'static [&'static str],
    pub icon: &'static str,
}

pub fn entries() -> &'static [CatalogEntry] {
    CATALOG
}

pub const AUTHOR: &str = "yantra";

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "python-3.12",
        name: "Python 3.12",
        description: "Python 3.12 runtime reading the program from standard input.",
        category: "language",
        dockerfile_template: "FROM python:3.12-slim\n\
            WORKDIR /sandbox\n\
            RUN useradd -m -u 1000 sandbox && chown sandbox:sandbox /sandbox\n\
            USER sandbox\n\
            CMD [\"python\", \"-\"]",
        default_run_command: &["python", "-"],
        tags: &["python", "python3", "scripting"],
        icon: "🐍",
    },
    CatalogEntry {
        id: "nodejs-20",
        name: "Node.js 20 LTS",
        description: "Node.js 20 LTS for server-side JavaScript scripts.",
        category: "language",
        dockerfile_template: "FROM node:20-slim\n\
            WORKDIR /sandbox\n\
            RUN useradd -m -u 1000 sandbox && chown sandbox:sandbox /sandbox\n\
            USER sandbox\n\
            CMD [\"node\", \"-\"]",
        default_run_command: &["node", "-"],
        tags: &["nodejs", "javascript", "js"],
        icon: "🟢",
    },
    CatalogEntry {
        id: "go-1.22",
        name: "Go 1.22",
        description: "Go 1.22 toolchain compiling and running the program from standard input.",
        category: "language",
        dockerfile_template: "FROM golang:1.22-alpine\n\
            WORKDIR /sandbox\n\
            RUN adduser -D -u 1000 sandbox && chown sandbox:sandbox /sandbox\n\
            USER sandbox\n\
            ENV CGO_ENABLED=0\n\
            CMD [\"go\", \"run\", \"/dev/stdin\"]",
        default_run_command: &["go", "run", "/dev/stdin"],
        tags: &["go", "golang", "compiled"],
        icon: "🐹",
    },
    CatalogEntry {
        id: "bash-5",
        name: "Bash 5",
        description: "GNU Bash with the usual coreutils, for shell scripts.",
        category: "shell",
        dockerfile_template: "FROM debian:bookworm-slim\n\
            WORKDIR /sandbox\n\
            RUN useradd -m -u 1000 sandbox && chown sandbox:sandbox /sandbox\n\
            USER sandbox\n\
            CMD [\"bash\", \"-s\"]",
        default_run_command: &["bash", "-s"],
        tags: &["bash", "shell", "scripting"],
        icon: "🐚",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entries_are_well_formed() {
        let entries = entries();
        assert!(!entries.is_empty());
        for entry in entries {
            assert!(!entry.id.is_empty());
            assert!(!entry.dockerfile_template.is_empty());
            assert!(!entry.default_run_command.is_empty());
        }
        // ids are unique; seeding relies on it
        let mut ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), entries.len());
    }
}
