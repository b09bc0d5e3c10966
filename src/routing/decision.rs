//! 路由决策
//!
//! 决策是 (操作类型, 激活后端, 可用后端, 配置) 的纯函数，没有副作用。

use std::fmt;

use crate::backend::tag::BackendTag;
use crate::core::config::RoutingConfig;
use crate::dispatch::operation::OperationKind;

/// 一类操作的路由决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub kind: OperationKind,
    /// 首先尝试的后端
    pub primary: BackendTag,
    /// 主后端失败后尝试的降级后端（可能与主后端相同）
    pub fallback: BackendTag,
    /// 执行前是否先校验影子状态
    pub requires_validation: bool,
    /// 人类可读的决策理由
    pub justification: String,
}

impl RoutingDecision {
    /// 日志与诊断记录中使用的简短描述
    pub fn summary(&self) -> String {
        format!(
            "{} -> {}/{}{}",
            self.kind.name(),
            self.primary,
            self.fallback,
            if self.requires_validation { " +validate" } else { "" }
        )
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.summary(), self.justification)
    }
}

/// 计算一类操作的路由决策
///
/// - 首选后端可用时优先，否则使用激活后端
/// - 着色器相关操作在专门的着色器后端可用时优先使用它
/// - 降级后端是除主后端外层级最低的通用后端；没有时与主后端相同
/// - 能力开关操作需要校验（可由配置关闭），其余操作不需要
pub fn compute_decision(
    kind: OperationKind,
    active: BackendTag,
    available: &[BackendTag],
    config: &RoutingConfig,
) -> RoutingDecision {
    let mut reasons = Vec::new();

    let base = match config.preferred_backend {
        Some(preferred) if available.contains(&preferred) => {
            reasons.push(format!("preferred backend {}", preferred));
            preferred
        }
        Some(preferred) => {
            reasons.push(format!(
                "preferred backend {} unavailable, using active {}",
                preferred, active
            ));
            active
        }
        None => {
            reasons.push(format!("active backend {}", active));
            active
        }
    };

    let primary = if kind.is_shader_related()
        && available.contains(&BackendTag::ShaderPipeline)
    {
        reasons.push("shader operation routed to specialised shader pipeline".to_string());
        BackendTag::ShaderPipeline
    } else if base.is_shader_pipeline() && !kind.is_shader_related() {
        // 着色器后端不服务通用操作
        let generic = highest_generic(available).unwrap_or(base);
        reasons.push(format!("shader pipeline cannot serve {}, using {}", kind.name(), generic));
        generic
    } else {
        base
    };

    let fallback = available
        .iter()
        .copied()
        .filter(|tag| *tag != primary && !tag.is_shader_pipeline())
        .min_by_key(|tag| tag.rank())
        .unwrap_or(primary);
    if fallback == primary {
        reasons.push("no distinct fallback tier".to_string());
    } else {
        reasons.push(format!("degrades to {}", fallback));
    }

    let requires_validation = kind.is_state_toggle() && config.validate_state_toggles;
    if requires_validation {
        reasons.push("state toggle validated before execution".to_string());
    }

    RoutingDecision {
        kind,
        primary,
        fallback,
        requires_validation,
        justification: reasons.join("; "),
    }
}

fn highest_generic(available: &[BackendTag]) -> Option<BackendTag> {
    available
        .iter()
        .copied()
        .filter(|tag| !tag.is_shader_pipeline())
        .max_by_key(|tag| tag.rank())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TIERS: [BackendTag; 4] = [
        BackendTag::Legacy,
        BackendTag::Gl21,
        BackendTag::Gl33,
        BackendTag::ShaderPipeline,
    ];

    #[test]
    fn test_shader_kinds_prefer_shader_pipeline() {
        let config = RoutingConfig::default();
        let decision =
            compute_decision(OperationKind::UseShaderProgram, BackendTag::Gl33, &ALL_TIERS, &config);
        assert_eq!(decision.primary, BackendTag::ShaderPipeline);
        assert_eq!(decision.fallback, BackendTag::Legacy);
        assert!(!decision.requires_validation);

        let without = [BackendTag::Legacy, BackendTag::Gl33];
        let decision =
            compute_decision(OperationKind::UseShaderProgram, BackendTag::Gl33, &without, &config);
        assert_eq!(decision.primary, BackendTag::Gl33);
    }

    #[test]
    fn test_state_toggles_require_validation() {
        let mut config = RoutingConfig::default();
        for kind in OperationKind::ALL {
            let decision = compute_decision(kind, BackendTag::Gl33, &ALL_TIERS, &config);
            assert_eq!(decision.requires_validation, kind.is_state_toggle(), "{}", kind);
        }

        config.validate_state_toggles = false;
        let decision =
            compute_decision(OperationKind::CapabilityEnable, BackendTag::Gl33, &ALL_TIERS, &config);
        assert!(!decision.requires_validation);
    }

    #[test]
    fn test_preferred_backend_wins_when_available() {
        let mut config = RoutingConfig::default();
        config.preferred_backend = Some(BackendTag::Gl21);
        let decision = compute_decision(OperationKind::BlendFunc, BackendTag::Gl33, &ALL_TIERS, &config);
        assert_eq!(decision.primary, BackendTag::Gl21);

        config.preferred_backend = Some(BackendTag::Gl45);
        let decision = compute_decision(OperationKind::BlendFunc, BackendTag::Gl33, &ALL_TIERS, &config);
        assert_eq!(decision.primary, BackendTag::Gl33);
        assert!(decision.justification.contains("unavailable"));
    }

    #[test]
    fn test_shader_pipeline_never_serves_generic_kinds() {
        let mut config = RoutingConfig::default();
        config.preferred_backend = Some(BackendTag::ShaderPipeline);
        let decision = compute_decision(OperationKind::Clear, BackendTag::Gl21, &ALL_TIERS, &config);
        assert_eq!(decision.primary, BackendTag::Gl33);
        assert_eq!(decision.fallback, BackendTag::Legacy);
    }

    #[test]
    fn test_single_backend_falls_back_to_itself() {
        let config = RoutingConfig::default();
        let decision =
            compute_decision(OperationKind::Color, BackendTag::Legacy, &[BackendTag::Legacy], &config);
        assert_eq!(decision.primary, BackendTag::Legacy);
        assert_eq!(decision.fallback, BackendTag::Legacy);
    }

    #[test]
    fn test_decision_is_pure() {
        let config = RoutingConfig::default();
        for kind in OperationKind::ALL {
            let a = compute_decision(kind, BackendTag::Gl33, &ALL_TIERS, &config);
            let b = compute_decision(kind, BackendTag::Gl33, &ALL_TIERS, &config);
            assert_eq!(a, b);
        }
    }
}
