//! Signature detail masks
//!
//! A [`DetailFlags`] value selects which parts of a method's structural
//! signature the renderer includes. Pointcut patterns are matched against
//! the signature rendered under the pointcut's own mask.

use bitflags::bitflags;

bitflags! {
    /// Independently-selectable signature detail bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DetailFlags: u64 {
        /// Containing module name
        const MODULE_NAME = 1 << 0;
        /// Containing module attributes
        const MODULE_ATTRS = 1 << 1;
        /// Declaring type attributes
        const DECLARING_TYPE_ATTRS = 1 << 2;
        /// Declaring type name
        const DECLARING_TYPE_NAME = 1 << 3;
        /// Declaring type generic parameter attributes
        const DECLARING_TYPE_GENERIC_ATTRS = 1 << 4;
        /// Declaring type generic parameter names
        const DECLARING_TYPE_GENERIC_NAMES = 1 << 5;
        /// Method attributes
        const METHOD_ATTRS = 1 << 6;
        /// Method name
        const METHOD_NAME = 1 << 7;
        /// Return type attributes
        const RETURN_TYPE_ATTRS = 1 << 8;
        /// Return type name
        const RETURN_TYPE_NAME = 1 << 9;
        /// Method generic parameter attributes
        const GENERIC_ARG_ATTRS = 1 << 10;
        /// Method generic parameter names
        const GENERIC_ARG_NAMES = 1 << 11;
        /// Parameter attributes
        const PARAM_ATTRS = 1 << 12;
        /// Parameter type names
        const PARAM_TYPE_NAMES = 1 << 13;
        /// Parameter names
        const PARAM_NAMES = 1 << 14;
        /// Access modifier (`public`, `private`, ...)
        const ACCESS_MODIFIER = 1 << 15;
        /// `static` modifier
        const STATIC_MODIFIER = 1 << 16;
        /// Override modifiers (`virtual`, `override`, `new`, `sealed`)
        const OVERRIDE_MODIFIER = 1 << 17;

        /// Render attribute constructor arguments
        const ATTR_ARGUMENTS = 1 << 59;
        /// Render attribute named properties
        const ATTR_PROPERTIES = 1 << 60;
        /// Include attributes of ancestor declaring types
        const ANCESTOR_DECLARING_TYPE_ATTRS = 1 << 61;
        /// Namespace-qualified type names
        const TYPE_FULL_NAMES = 1 << 62;

        /// Plain local signature without qualification
        const SIMPLE = Self::RETURN_TYPE_NAME.bits()
            | Self::DECLARING_TYPE_NAME.bits()
            | Self::METHOD_NAME.bits()
            | Self::GENERIC_ARG_NAMES.bits()
            | Self::PARAM_TYPE_NAMES.bits()
            | Self::PARAM_NAMES.bits();
        /// `SIMPLE` with fully-qualified type names
        const LOCAL_SIGNATURE = Self::TYPE_FULL_NAMES.bits() | Self::SIMPLE.bits();
        /// `LOCAL_SIGNATURE` prefixed with the module name
        const GLOBAL_SIGNATURE = Self::MODULE_NAME.bits() | Self::LOCAL_SIGNATURE.bits();
        /// Every detail bit
        const ALL = u64::MAX;
    }
}

impl Default for DetailFlags {
    fn default() -> Self {
        DetailFlags::SIMPLE
    }
}
