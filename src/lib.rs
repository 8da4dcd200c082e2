// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! lilith-mitm: an interactive MCP man-in-the-middle proxy.
//!
//! This library provides the core interception engine for lilith-mitm:
//! a bidirectional JSON-RPC 2.0 pipeline that sits between an MCP client
//! and server, captures every message, and lets an operator hold, edit,
//! drop, and replay traffic for security research.

pub mod config;
pub mod core;
pub mod mcp;
pub mod utils;
