// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented deckhand.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ProjectName;

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, project: Option<&str>, host: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project = match project {
        Some(p) => ProjectName::new(p).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => ProjectName::new("myapp").map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };
    let host = host.unwrap_or("server.example.com");

    std::fs::write(&config_path, template_yaml(&project, host))?;
    Ok(())
}

fn template_yaml(project: &ProjectName, host: &str) -> String {
    format!(
        r#"project: {project}

target:
  host: {host}
  user: deploy
  root: /opt/{project}
  # Set to true to accept the host key on first connection
  # trust_first_connection: false

images:
  - {project}-api
  - {project}-web

compose_file: docker-compose.yml
required_files:
  - .env
ports: [3000, 8080]

# Builds {project}-api:$APP_VERSION and {project}-web:$APP_VERSION locally
# build:
#   command: docker compose build

# Only needed for the registry transport
# registry:
#   url: registry.example.com
#   user: deploy
#   token: {{ env: REGISTRY_TOKEN }}

backup:
  command: ./scripts/backup.sh
  dir: backups
  retention_days: 7
  min_size_bytes: 102400

health:
  settle: 10s
  interval: 5s
  attempts: 12
  timeout: 2m
  checks:
    - name: api
      url: http://localhost:3000/health
      expect: json:status=healthy
    - name: web
      url: http://localhost:8080/
      expect: http-ok

preflight:
  name_mismatch: warn
"#
    )
}
