pub mod agent_loop;
pub mod autonomous;
pub mod heartbeat;
pub mod history;
pub mod response;
pub mod system_prompt;
pub mod tools;
pub mod turn;

pub use agent_loop::{Agent, AgentDeps, AgentEvents};
pub use autonomous::AutonomousAgent;
pub use heartbeat::{Heartbeat, HeartbeatExecutor};
pub use history::{History, MAX_HISTORY};
pub use response::{parse_agent_response, AgentResponse, ResponseKind};
pub use tools::{SpawnSubAgent, SubAgentSettings, Tool, ToolDispatcher, ToolRegistry, ToolResult};
pub use turn::{run_tool_loop, MAX_TOOL_ROUNDS};
