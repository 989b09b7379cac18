pub mod k8s;

/// Fixed name of the singleton jump pod.
pub const DEFAULT_JUMP_POD_NAME: &str = "sshjump";

/// Container image used by the built-in jump pod manifest.
pub const DEFAULT_JUMP_IMAGE: &str = "docker.io/corbinu/ssh-server:latest";

/// Name of the single container inside the jump pod.
pub const JUMP_CONTAINER_NAME: &str = "sshjump";

/// Local port the forwarder binds; the SSH client connects here.
pub const DEFAULT_LOCAL_PORT: u16 = 2222;

/// SSH port inside the jump pod.
pub const DEFAULT_REMOTE_PORT: u16 = 22;

/// Account used when authenticating to the jump pod itself.
pub const JUMP_USER: &str = "root";

/// File names under the project data directory.
pub const OPTIONS_FILE_NAME: &str = "options";
pub const AGENT_PID_FILE_NAME: &str = "agent.pid";
pub const AGENT_ENV_FILE_NAME: &str = "agent.env";
pub const JUMP_KEY_FILE_NAME: &str = "jump_id";

/// Fallback SSH port for destinations when nothing is persisted.
pub const DEFAULT_SSH_PORT: u16 = 22;
